//! Declaration registry: the symbol table built while a schema is compiled.
//!
//! Types, packets and groups share one namespace. Each kind is stored in
//! declaration order with a name index beside it.

use crate::ast::*;
use crate::error::{CompileError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Declarations {
    endianness: Endianness,
    types: Vec<TypeDef>,
    types_by_name: HashMap<String, usize>,
    packets: Vec<PacketDef>,
    packets_by_name: HashMap<String, usize>,
    groups: Vec<GroupDef>,
    groups_by_name: HashMap<String, usize>,
}

impl Declarations {
    pub fn new(endianness: Endianness) -> Self {
        Declarations {
            endianness,
            types: Vec::new(),
            types_by_name: HashMap::new(),
            packets: Vec::new(),
            packets_by_name: HashMap::new(),
            groups: Vec::new(),
            groups_by_name: HashMap::new(),
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn add_type(&mut self, def: TypeDef) -> Result<()> {
        self.check_unique(def.name(), def.loc())?;
        tracing::debug!(name = def.name(), kind = def.kind(), "declared type");
        self.types_by_name
            .insert(def.name().to_string(), self.types.len());
        self.types.push(def);
        Ok(())
    }

    pub fn add_packet(&mut self, def: PacketDef) -> Result<()> {
        self.check_unique(&def.name, def.loc)?;
        tracing::debug!(
            name = %def.name,
            fields = def.layout.fields.len(),
            fixed_size = def.is_fixed_size(),
            "declared packet"
        );
        self.packets_by_name
            .insert(def.name.clone(), self.packets.len());
        self.packets.push(def);
        Ok(())
    }

    pub fn add_group(&mut self, def: GroupDef) -> Result<()> {
        self.check_unique(&def.name, def.loc)?;
        tracing::debug!(name = %def.name, fields = def.fields.len(), "declared group");
        self.groups_by_name.insert(def.name.clone(), self.groups.len());
        self.groups.push(def);
        Ok(())
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types_by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn get_packet(&self, name: &str) -> Option<&PacketDef> {
        self.packets_by_name.get(name).map(|&i| &self.packets[i])
    }

    pub fn get_group(&self, name: &str) -> Option<&GroupDef> {
        self.groups_by_name.get(name).map(|&i| &self.groups[i])
    }

    pub fn get_enum(&self, name: &str) -> Option<&EnumDef> {
        match self.get_type(name) {
            Some(TypeDef::Enum(def)) => Some(def),
            _ => None,
        }
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        match self.get_type(name) {
            Some(TypeDef::Struct(def)) => Some(def),
            _ => None,
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    pub fn packets(&self) -> impl Iterator<Item = &PacketDef> {
        self.packets.iter()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupDef> {
        self.groups.iter()
    }

    /// What kind of declaration `name` is, if it is declared at all.
    pub fn kind_of(&self, name: &str) -> Option<&'static str> {
        if let Some(def) = self.get_type(name) {
            Some(def.kind())
        } else if self.get_packet(name).is_some() {
            Some("packet")
        } else if self.get_group(name).is_some() {
            Some("group")
        } else {
            None
        }
    }

    /// Error for a reference to `name` that expected a declaration of kind
    /// `expected`: a kind mismatch when the name exists, otherwise undeclared.
    pub fn lookup_error(&self, name: &str, expected: &'static str, loc: Location) -> CompileError {
        match self.kind_of(name) {
            Some(found) => CompileError::KindMismatch {
                loc,
                name: name.to_string(),
                found,
                expected,
            },
            None => CompileError::Undeclared {
                loc,
                kind: expected,
                name: name.to_string(),
            },
        }
    }

    /// Resolve the type named by a `name : Type` field.
    pub fn resolve_type(&self, name: &str, loc: Location) -> Result<&TypeDef> {
        self.get_type(name)
            .ok_or_else(|| self.lookup_error(name, "type", loc))
    }

    /// Attach test vectors to a declared packet. Repeated literals collapse.
    pub fn add_test_cases(
        &mut self,
        packet: &str,
        cases: impl IntoIterator<Item = String>,
        loc: Location,
    ) -> Result<()> {
        let index = match self.packets_by_name.get(packet) {
            Some(&i) => i,
            None => return Err(self.lookup_error(packet, "packet", loc)),
        };
        let tests = &mut self.packets[index].tests;
        let before = tests.len();
        tests.extend(cases);
        tracing::debug!(packet, added = tests.len() - before, "attached test cases");
        Ok(())
    }

    fn declared_at(&self, name: &str) -> Option<Location> {
        self.get_type(name)
            .map(TypeDef::loc)
            .or_else(|| self.get_packet(name).map(|p| p.loc))
            .or_else(|| self.get_group(name).map(|g| g.loc))
    }

    fn check_unique(&self, name: &str, loc: Location) -> Result<()> {
        match self.declared_at(name) {
            Some(first) => Err(CompileError::Redeclared {
                loc,
                name: name.to_string(),
                first,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn at(line: usize) -> Location {
        Location { line, column: 1 }
    }

    fn color(line: usize) -> TypeDef {
        let mut tags = BTreeMap::new();
        tags.insert(0, "RED".to_string());
        TypeDef::Enum(EnumDef {
            name: "Color".to_string(),
            width: 8,
            tags,
            loc: at(line),
        })
    }

    #[test]
    fn lookup_after_insert() {
        let mut decls = Declarations::new(Endianness::Big);
        decls.add_type(color(2)).expect("add");
        assert_eq!(decls.endianness(), Endianness::Big);
        assert!(decls.get_enum("Color").is_some());
        assert!(decls.get_struct("Color").is_none());
        assert!(decls.get_packet("Color").is_none());
        assert_eq!(decls.kind_of("Color"), Some("enum"));
    }

    #[test]
    fn redeclaration_reports_first_location() {
        let mut decls = Declarations::new(Endianness::Little);
        decls.add_type(color(2)).expect("add");
        let err = decls.add_type(color(7)).unwrap_err();
        assert_eq!(
            err,
            CompileError::Redeclared {
                loc: at(7),
                name: "Color".to_string(),
                first: at(2),
            }
        );
    }

    #[test]
    fn redeclaration_across_namespaces() {
        let mut decls = Declarations::new(Endianness::Little);
        decls.add_type(color(2)).expect("add");
        let group = GroupDef {
            name: "Color".to_string(),
            fields: Vec::new(),
            loc: at(4),
        };
        assert!(matches!(
            decls.add_group(group),
            Err(CompileError::Redeclared { .. })
        ));
    }

    #[test]
    fn resolve_type_distinguishes_missing_and_wrong_kind() {
        let mut decls = Declarations::new(Endianness::Little);
        decls
            .add_group(GroupDef {
                name: "Header".to_string(),
                fields: Vec::new(),
                loc: at(1),
            })
            .expect("add");
        assert!(matches!(
            decls.resolve_type("Header", at(3)),
            Err(CompileError::KindMismatch { found: "group", .. })
        ));
        assert!(matches!(
            decls.resolve_type("Nope", at(3)),
            Err(CompileError::Undeclared { kind: "type", .. })
        ));
    }

    #[test]
    fn test_cases_need_a_packet() {
        let mut decls = Declarations::new(Endianness::Little);
        decls.add_type(color(1)).expect("add");
        let err = decls
            .add_test_cases("Color", vec!["00".to_string()], at(5))
            .unwrap_err();
        assert!(matches!(err, CompileError::KindMismatch { expected: "packet", .. }));
        let err = decls
            .add_test_cases("Missing", vec!["00".to_string()], at(5))
            .unwrap_err();
        assert!(matches!(err, CompileError::Undeclared { kind: "packet", .. }));
    }
}
