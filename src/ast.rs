//! Abstract syntax tree for the packet description language.
//!
//! Declarations ([`TypeDef`], [`PacketDef`], [`GroupDef`]) own their fields by
//! value. References between declarations are by name and are resolved through
//! the [`Declarations`](crate::decls::Declarations) registry.

use crate::decls::Declarations;
use crate::error::{CompileError, Result};
use crate::group;
use crate::layout::Layout;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::ops::Deref;

/// 1-based line and column of a construct in the schema source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endianness::Little => f.write_str("little_endian_packets"),
            Endianness::Big => f.write_str("big_endian_packets"),
        }
    }
}

// ==================== Type declarations ====================

/// Integer-backed enumeration. Values and tags are both unique.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub width: u32,
    pub tags: BTreeMap<u64, String>,
    pub loc: Location,
}

impl EnumDef {
    pub fn value_of(&self, tag: &str) -> Option<u64> {
        self.tags
            .iter()
            .find(|(_, t)| t.as_str() == tag)
            .map(|(&v, _)| v)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.value_of(tag).is_some()
    }
}

/// Externally implemented field type; `width` is `None` for variable-size types.
#[derive(Debug, Clone)]
pub struct CustomFieldDef {
    pub name: String,
    pub width: Option<u32>,
    pub backing: String,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub struct ChecksumDef {
    pub name: String,
    pub width: u32,
    pub backing: String,
    pub loc: Location,
}

/// Common shape of structs and packets.
///
/// `fields` holds only the fields declared by this record (groups already
/// inlined). The inherited view, with parent constraints applied, lives in
/// `layout.fields`.
#[derive(Debug, Clone)]
pub struct RecordDef {
    pub name: String,
    pub fields: Vec<PacketField>,
    pub parent: Option<String>,
    pub constraints: Vec<Constraint>,
    pub layout: Layout,
    pub loc: Location,
}

impl RecordDef {
    pub fn is_fixed_size(&self) -> bool {
        self.layout.is_fixed_size()
    }
}

pub type StructDef = RecordDef;

/// A top-level wire record, plus the test vectors attached to it.
#[derive(Debug, Clone)]
pub struct PacketDef {
    pub record: RecordDef,
    pub tests: BTreeSet<String>,
}

impl PacketDef {
    pub fn new(record: RecordDef) -> Self {
        PacketDef {
            record,
            tests: BTreeSet::new(),
        }
    }
}

impl Deref for PacketDef {
    type Target = RecordDef;

    fn deref(&self) -> &RecordDef {
        &self.record
    }
}

/// A named field template, inlined wherever it is used.
#[derive(Debug, Clone)]
pub struct GroupDef {
    pub name: String,
    pub fields: Vec<PacketField>,
    pub loc: Location,
}

#[derive(Debug, Clone)]
pub enum TypeDef {
    Enum(EnumDef),
    Struct(StructDef),
    CustomField(CustomFieldDef),
    Checksum(ChecksumDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Enum(d) => &d.name,
            TypeDef::Struct(d) => &d.name,
            TypeDef::CustomField(d) => &d.name,
            TypeDef::Checksum(d) => &d.name,
        }
    }

    pub fn loc(&self) -> Location {
        match self {
            TypeDef::Enum(d) => d.loc,
            TypeDef::Struct(d) => d.loc,
            TypeDef::CustomField(d) => d.loc,
            TypeDef::Checksum(d) => d.loc,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypeDef::Enum(_) => "enum",
            TypeDef::Struct(_) => "struct",
            TypeDef::CustomField(_) => "custom field",
            TypeDef::Checksum(_) => "checksum",
        }
    }

    /// Build a field of this type bound to the local name `name`.
    pub fn new_field(&self, name: String, loc: Location) -> PacketField {
        let kind = match self {
            TypeDef::Enum(d) => FieldKind::Enum {
                name,
                enum_id: d.name.clone(),
                width: d.width,
            },
            TypeDef::Struct(d) => FieldKind::Struct {
                name,
                struct_id: d.name.clone(),
            },
            TypeDef::CustomField(d) => FieldKind::Custom {
                name,
                type_id: d.name.clone(),
                width: d.width,
            },
            TypeDef::Checksum(d) => FieldKind::Checksum {
                name,
                type_id: d.name.clone(),
                width: d.width,
            },
        };
        PacketField::new(kind, loc)
    }

    /// Element type for arrays and vectors of this type.
    pub fn element_type(&self, loc: Location) -> Result<ElementType> {
        match self {
            TypeDef::Enum(d) => Ok(ElementType::Enum {
                enum_id: d.name.clone(),
                width: d.width,
            }),
            TypeDef::Struct(d) => Ok(ElementType::Struct(d.name.clone())),
            TypeDef::CustomField(d) => Ok(ElementType::Custom {
                type_id: d.name.clone(),
                width: d.width,
            }),
            TypeDef::Checksum(d) => Err(CompileError::KindMismatch {
                loc,
                name: d.name.clone(),
                found: "checksum",
                expected: "enum, struct or custom field",
            }),
        }
    }
}

// ==================== Constraints ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintValue {
    Int(u64),
    Tag(String),
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintValue::Int(v) => write!(f, "{}", v),
            ConstraintValue::Tag(t) => f.write_str(t),
        }
    }
}

/// `field = value`, used by group instantiation and parent constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub field: String,
    pub value: ConstraintValue,
    pub loc: Location,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.field, self.value)
    }
}

// ==================== Fields ====================

/// Element of an array or vector field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Scalar(u32),
    Enum { enum_id: String, width: u32 },
    Struct(String),
    Custom { type_id: String, width: Option<u32> },
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Scalar(w) => write!(f, "{}", w),
            ElementType::Enum { enum_id, .. } => f.write_str(enum_id),
            ElementType::Struct(id) => f.write_str(id),
            ElementType::Custom { type_id, .. } => f.write_str(type_id),
        }
    }
}

/// Field variants. `Group` only exists between parsing a field and inlining it
/// into a [`FieldList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Scalar {
        name: String,
        width: u32,
    },
    Enum {
        name: String,
        enum_id: String,
        width: u32,
    },
    Struct {
        name: String,
        struct_id: String,
    },
    Custom {
        name: String,
        type_id: String,
        width: Option<u32>,
    },
    Checksum {
        name: String,
        type_id: String,
        width: u32,
    },
    /// `name` is set when the field was fixed by a constraint.
    FixedScalar {
        name: Option<String>,
        value: u64,
        width: u32,
    },
    FixedEnum {
        name: Option<String>,
        enum_id: String,
        tag: String,
        width: u32,
    },
    Body,
    Payload {
        size_modifier: Option<String>,
    },
    ChecksumStart {
        field: String,
    },
    Padding {
        octets: u32,
    },
    /// `target` is a field name, `payload` or `body`.
    Size {
        target: String,
        width: u32,
    },
    Count {
        target: String,
        width: u32,
    },
    Reserved {
        width: u32,
    },
    Array {
        name: String,
        element: ElementType,
        count: u64,
    },
    Vector {
        name: String,
        element: ElementType,
        size_modifier: Option<String>,
    },
    Group {
        group_id: String,
        constraints: Vec<Constraint>,
    },
}

impl FieldKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldKind::Scalar { .. } => "scalar",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Struct { .. } => "struct",
            FieldKind::Custom { .. } => "custom",
            FieldKind::Checksum { .. } => "checksum",
            FieldKind::FixedScalar { .. } | FieldKind::FixedEnum { .. } => "fixed",
            FieldKind::Body => "body",
            FieldKind::Payload { .. } => "payload",
            FieldKind::ChecksumStart { .. } => "checksum_start",
            FieldKind::Padding { .. } => "padding",
            FieldKind::Size { .. } => "size",
            FieldKind::Count { .. } => "count",
            FieldKind::Reserved { .. } => "reserved",
            FieldKind::Array { .. } => "array",
            FieldKind::Vector { .. } => "vector",
            FieldKind::Group { .. } => "group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketField {
    pub kind: FieldKind,
    pub loc: Location,
}

impl PacketField {
    pub fn new(kind: FieldKind, loc: Location) -> Self {
        PacketField { kind, loc }
    }

    /// The field's identifier, if it has one.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Scalar { name, .. }
            | FieldKind::Enum { name, .. }
            | FieldKind::Struct { name, .. }
            | FieldKind::Custom { name, .. }
            | FieldKind::Checksum { name, .. }
            | FieldKind::Array { name, .. }
            | FieldKind::Vector { name, .. } => Some(name),
            FieldKind::FixedScalar { name, .. } | FieldKind::FixedEnum { name, .. } => {
                name.as_deref()
            }
            _ => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::FixedScalar { .. } | FieldKind::FixedEnum { .. }
        )
    }

    pub fn is_payload_or_body(&self) -> bool {
        matches!(self.kind, FieldKind::Body | FieldKind::Payload { .. })
    }
}

/// Renders the field in schema syntax. Fields fixed by a constraint are shown
/// as `fixed name = value : type`.
impl fmt::Display for PacketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldKind::Scalar { name, width } => write!(f, "{} : {}", name, width),
            FieldKind::Enum { name, enum_id, .. } => write!(f, "{} : {}", name, enum_id),
            FieldKind::Struct { name, struct_id } => write!(f, "{} : {}", name, struct_id),
            FieldKind::Custom { name, type_id, .. } | FieldKind::Checksum { name, type_id, .. } => {
                write!(f, "{} : {}", name, type_id)
            }
            FieldKind::FixedScalar { name, value, width } => match name {
                Some(n) => write!(f, "fixed {} = {} : {}", n, value, width),
                None => write!(f, "fixed = {} : {}", value, width),
            },
            FieldKind::FixedEnum {
                name, enum_id, tag, ..
            } => match name {
                Some(n) => write!(f, "fixed {} = {} : {}", n, tag, enum_id),
                None => write!(f, "fixed = {} : {}", tag, enum_id),
            },
            FieldKind::Body => f.write_str("body"),
            FieldKind::Payload { size_modifier } => match size_modifier {
                Some(m) => write!(f, "payload : [{}]", m),
                None => f.write_str("payload"),
            },
            FieldKind::ChecksumStart { field } => write!(f, "checksum_start({})", field),
            FieldKind::Padding { octets } => write!(f, "padding({})", octets),
            FieldKind::Size { target, width } => write!(f, "size({}) : {}", target, width),
            FieldKind::Count { target, width } => write!(f, "count({}) : {}", target, width),
            FieldKind::Reserved { width } => write!(f, "reserved : {}", width),
            FieldKind::Array {
                name,
                element,
                count,
            } => write!(f, "{} : {}[{}]", name, element, count),
            FieldKind::Vector {
                name,
                element,
                size_modifier,
            } => write!(
                f,
                "{} : {}[{}]",
                name,
                element,
                size_modifier.as_deref().unwrap_or("")
            ),
            FieldKind::Group {
                group_id,
                constraints,
            } => {
                f.write_str(group_id)?;
                if !constraints.is_empty() {
                    let parts: Vec<String> = constraints.iter().map(|c| c.to_string()).collect();
                    write!(f, "({})", parts.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Field list assembled back to front: each field is prepended onto the list
/// built from the fields that follow it, so the finished list is in
/// declaration order without a reversal pass.
#[derive(Debug, Default)]
pub struct FieldList {
    fields: VecDeque<PacketField>,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `field`. A group field is replaced by the group's (possibly
    /// specialised) fields, in their declared order.
    pub fn prepend(&mut self, field: PacketField, decls: &Declarations) -> Result<()> {
        if let FieldKind::Group {
            group_id,
            constraints,
        } = &field.kind
        {
            let expanded = group::expand(decls, group_id, constraints, field.loc)?;
            for f in expanded.into_iter().rev() {
                self.fields.push_front(f);
            }
        } else {
            self.fields.push_front(field);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketField> {
        self.fields.iter()
    }

    pub fn into_vec(self) -> Vec<PacketField> {
        self.fields.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, width: u32) -> PacketField {
        PacketField::new(
            FieldKind::Scalar {
                name: name.to_string(),
                width,
            },
            Location::default(),
        )
    }

    #[test]
    fn prepend_keeps_declaration_order() {
        let decls = Declarations::new(Endianness::Little);
        let mut list = FieldList::new();
        for f in [scalar("x", 8), scalar("y", 8), scalar("z", 8)].into_iter().rev() {
            list.prepend(f, &decls).expect("prepend");
        }
        let names: Vec<_> = list.iter().filter_map(PacketField::name).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn display_uses_schema_syntax() {
        let loc = Location::default();
        let size = PacketField::new(
            FieldKind::Size {
                target: "payload".to_string(),
                width: 8,
            },
            loc,
        );
        assert_eq!(size.to_string(), "size(payload) : 8");
        let vector = PacketField::new(
            FieldKind::Vector {
                name: "data".to_string(),
                element: ElementType::Scalar(8),
                size_modifier: Some("+2".to_string()),
            },
            loc,
        );
        assert_eq!(vector.to_string(), "data : 8[+2]");
        let fixed = PacketField::new(
            FieldKind::FixedScalar {
                name: Some("op".to_string()),
                value: 5,
                width: 8,
            },
            loc,
        );
        assert_eq!(fixed.to_string(), "fixed op = 5 : 8");
        assert_eq!(fixed.name(), Some("op"));
    }

    #[test]
    fn enum_lookup_by_tag() {
        let mut tags = BTreeMap::new();
        tags.insert(0, "RED".to_string());
        tags.insert(1, "GREEN".to_string());
        let def = EnumDef {
            name: "Color".to_string(),
            width: 8,
            tags,
            loc: Location::default(),
        };
        assert_eq!(def.value_of("GREEN"), Some(1));
        assert!(!def.has_tag("BLUE"));
    }
}
