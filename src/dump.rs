//! Format compiled declarations for display (`check_schema --dump`).
//!
//! Declarations are listed in source order. Records show their visible
//! fields, one per line, with static bit offsets, sizes and the record each
//! inherited field comes from.

use crate::ast::*;
use crate::decls::Declarations;
use crate::layout::{Layout, ResolvedField};

enum Entry<'a> {
    Type(&'a TypeDef),
    Group(&'a GroupDef),
    Packet(&'a PacketDef),
}

impl Entry<'_> {
    fn loc(&self) -> Location {
        match self {
            Entry::Type(def) => def.loc(),
            Entry::Group(def) => def.loc,
            Entry::Packet(def) => def.loc,
        }
    }
}

/// Render every declaration in `decls`.
pub fn dump(decls: &Declarations) -> String {
    let mut entries: Vec<Entry> = decls
        .types()
        .map(Entry::Type)
        .chain(decls.groups().map(Entry::Group))
        .chain(decls.packets().map(Entry::Packet))
        .collect();
    entries.sort_by_key(|e| {
        let loc = e.loc();
        (loc.line, loc.column)
    });

    let mut out = format!("{}\n", decls.endianness());
    for entry in entries {
        out.push('\n');
        match entry {
            Entry::Type(TypeDef::Enum(def)) => dump_enum(&mut out, def),
            Entry::Type(TypeDef::CustomField(def)) => {
                let width = def.width.map(|w| format!(" : {}", w)).unwrap_or_default();
                out.push_str(&format!(
                    "custom_field {}{} {:?}\n",
                    def.name, width, def.backing
                ));
            }
            Entry::Type(TypeDef::Checksum(def)) => {
                out.push_str(&format!(
                    "checksum {} : {} {:?}\n",
                    def.name, def.width, def.backing
                ));
            }
            Entry::Type(TypeDef::Struct(def)) => dump_record(&mut out, "struct", def, None),
            Entry::Group(def) => dump_group(&mut out, def),
            Entry::Packet(def) => dump_record(&mut out, "packet", def, Some(def.tests.len())),
        }
    }
    out
}

fn dump_enum(out: &mut String, def: &EnumDef) {
    out.push_str(&format!("enum {} : {} {{\n", def.name, def.width));
    for (value, tag) in &def.tags {
        out.push_str(&format!("  {} = {:#x}\n", tag, value));
    }
    out.push_str("}\n");
}

fn dump_group(out: &mut String, def: &GroupDef) {
    out.push_str(&format!("group {} {{\n", def.name));
    for field in &def.fields {
        out.push_str(&format!("  {}\n", field));
    }
    out.push_str("}\n");
}

fn dump_record(out: &mut String, keyword: &str, def: &RecordDef, tests: Option<usize>) {
    out.push_str(&format!("{} {}", keyword, def.name));
    if let Some(parent) = &def.parent {
        out.push_str(&format!(" : {}", parent));
        if !def.constraints.is_empty() {
            let list: Vec<String> = def.constraints.iter().map(|c| c.to_string()).collect();
            out.push_str(&format!(" ({})", list.join(", ")));
        }
    }
    out.push_str(&format!(" {{  // {}", def.layout.size));
    match tests {
        Some(1) => out.push_str(", 1 test case"),
        Some(n) if n > 0 => out.push_str(&format!(", {} test cases", n)),
        _ => {}
    }
    out.push('\n');
    for field in &def.layout.fields {
        out.push_str(&field_line(&def.name, &def.layout, field));
        out.push('\n');
    }
    out.push_str("}\n");
}

fn field_line(record: &str, layout: &Layout, resolved: &ResolvedField) -> String {
    let offset = match resolved.offset {
        Some(bits) => format!("@{}", bits),
        None => "@?".to_string(),
    };
    let mut line = format!("  {:<6} {}  ({})", offset, resolved.field, resolved.size);
    if let Some(target) = resolved.target.and_then(|i| layout.fields.get(i)) {
        let name = match (&target.field.kind, target.field.name()) {
            (_, Some(name)) => name.to_string(),
            (FieldKind::Body, None) => "body".to_string(),
            _ => "payload".to_string(),
        };
        line.push_str(&format!(" -> {}", name));
    }
    if resolved.origin != record {
        line.push_str(&format!(" [from {}]", resolved.origin));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::compile;

    #[test]
    fn dump_lists_declarations_in_source_order() {
        let decls = compile(
            "big_endian_packets\n\
             enum Op : 8 { READ = 1, WRITE = 2 }\n\
             packet Base { op : Op, size(payload) : 8, payload }\n\
             packet Read : Base (op = READ) { addr : 16 }\n\
             test Read { \"\\x01\\x02\\x00\\x10\" }\n",
        )
        .expect("compile");
        let text = dump(&decls);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "big_endian_packets");
        let op = text.find("enum Op").expect("enum listed");
        let base = text.find("packet Base").expect("base listed");
        let read = text.find("packet Read").expect("child listed");
        assert!(op < base && base < read);
        assert!(text.contains("packet Read : Base (op = READ) {  // 32 bits, 1 test case"));
        assert!(text.contains("@0"));
        assert!(text.contains("[from Base]"));
        assert!(text.contains("-> payload"));
    }

    #[test]
    fn dynamic_offsets_are_unknown() {
        let decls = compile(
            "little_endian_packets\n\
             packet P { count(items) : 8, items : 8[], tail : 8 }\n",
        )
        .expect("compile");
        let text = dump(&decls);
        assert!(text.contains("// dynamic"));
        assert!(text.contains("@?"));
        assert!(text.contains("-> items"));
    }
}
