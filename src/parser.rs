//! Parse schema source with PEST and run each declaration's semantic action.
//!
//! The whole file is checked against the grammar first; declarations are then
//! processed in textual order, each one committing to the [`Declarations`]
//! registry before the next is looked at.

use crate::ast::*;
use crate::decls::Declarations;
use crate::error::{CompileError, Result};
use crate::group::check_fits;
use crate::inherit::{check_unique_names, resolve_record, ParentSpec, RecordKind};
use pest::error::LineColLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::collections::BTreeMap;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Compile schema source into resolved declarations.
pub fn compile(source: &str) -> Result<Declarations> {
    let mut pairs = SchemaParser::parse(Rule::file, source).map_err(syntax_error)?;
    let file = pairs.next().ok_or_else(|| CompileError::Syntax {
        loc: Location { line: 1, column: 1 },
        message: "empty parse".to_string(),
    })?;
    let file_loc = location(&file);
    let mut inner = file.into_inner();
    let header = next_pair(&mut inner, file_loc, "endianness declaration")?;
    let endianness = build_endianness(header)?;
    tracing::debug!(%endianness, "compiling schema");

    let mut decls = Declarations::new(endianness);
    for pair in inner {
        match pair.as_rule() {
            Rule::enum_decl => decls.add_type(TypeDef::Enum(build_enum(pair)?))?,
            Rule::custom_field_decl => {
                decls.add_type(TypeDef::CustomField(build_custom_field(pair)?))?
            }
            Rule::checksum_decl => decls.add_type(TypeDef::Checksum(build_checksum(pair)?))?,
            Rule::group_decl => {
                let def = build_group(pair, &decls)?;
                decls.add_group(def)?
            }
            Rule::struct_decl => {
                let def = build_record(pair, &decls, RecordKind::Struct)?;
                decls.add_type(TypeDef::Struct(def))?
            }
            Rule::packet_decl => {
                let def = build_record(pair, &decls, RecordKind::Packet)?;
                decls.add_packet(PacketDef::new(def))?
            }
            Rule::test_decl => build_tests(pair, &mut decls)?,
            _ => {}
        }
    }
    Ok(decls)
}

// ==================== Errors and locations ====================

fn syntax_error(e: pest::error::Error<Rule>) -> CompileError {
    let e = e.renamed_rules(rule_name);
    let (line, column) = match e.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    CompileError::Syntax {
        loc: Location { line, column },
        message: e.variant.message().into_owned(),
    }
}

fn rule_name(rule: &Rule) -> String {
    let name = match rule {
        Rule::EOI => "end of input",
        Rule::identifier => "identifier",
        Rule::integer => "integer",
        Rule::string => "string literal",
        Rule::size_modifier => "size modifier",
        Rule::endianness => "`little_endian_packets` or `big_endian_packets`",
        Rule::enumerator => "enumerator",
        Rule::constraint => "constraint",
        Rule::array_spec => "`[`",
        Rule::kw_enum => "`enum`",
        Rule::kw_custom_field => "`custom_field`",
        Rule::kw_checksum => "`checksum`",
        Rule::kw_group => "`group`",
        Rule::kw_struct => "`struct`",
        Rule::kw_packet => "`packet`",
        Rule::kw_test => "`test`",
        Rule::kw_body | Rule::body_field => "`body`",
        Rule::kw_payload | Rule::payload_field => "`payload`",
        Rule::kw_checksum_start | Rule::checksum_start_field => "`checksum_start`",
        Rule::kw_padding | Rule::padding_field => "`padding`",
        Rule::kw_size | Rule::size_field => "`size`",
        Rule::kw_count | Rule::count_field => "`count`",
        Rule::kw_fixed | Rule::fixed_field => "`fixed`",
        Rule::kw_reserved | Rule::reserved_field => "`reserved`",
        Rule::typed_field | Rule::group_field => "field",
        other => return format!("{:?}", other),
    };
    name.to_string()
}

fn location(pair: &Pair<Rule>) -> Location {
    let (line, column) = pair.as_span().start_pos().line_col();
    Location { line, column }
}

fn missing(loc: Location, what: &str) -> CompileError {
    CompileError::Syntax {
        loc,
        message: format!("missing {}", what),
    }
}

fn next_pair<'i>(
    pairs: &mut Pairs<'i, Rule>,
    loc: Location,
    what: &str,
) -> Result<Pair<'i, Rule>> {
    pairs.next().ok_or_else(|| missing(loc, what))
}

/// First direct child of `pair` produced by `rule`.
fn child<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> Option<Pair<'i, Rule>> {
    pair.clone().into_inner().find(|p| p.as_rule() == rule)
}

fn required<'i>(pair: &Pair<'i, Rule>, rule: Rule, what: &str) -> Result<Pair<'i, Rule>> {
    child(pair, rule).ok_or_else(|| missing(location(pair), what))
}

fn children<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.clone().into_inner().filter(move |p| p.as_rule() == rule)
}

// ==================== Literals ====================

fn parse_integer(pair: &Pair<Rule>) -> Result<u64> {
    let s = pair.as_str();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| CompileError::IntegerOverflow {
        loc: location(pair),
        literal: s.to_string(),
    })
}

/// Width of a value-carrying field: 1 to 64 bits.
fn scalar_width(pair: &Pair<Rule>) -> Result<u32> {
    let width = parse_integer(pair)?;
    if width == 0 || width > 64 {
        return Err(CompileError::InvalidWidth {
            loc: location(pair),
            width,
            reason: "value widths range from 1 to 64 bits",
        });
    }
    Ok(width as u32)
}

/// Width of an opaque region (reserved, custom field, checksum).
fn region_width(pair: &Pair<Rule>) -> Result<u32> {
    let width = parse_integer(pair)?;
    match u32::try_from(width) {
        Ok(0) => Err(CompileError::InvalidWidth {
            loc: location(pair),
            width,
            reason: "width must be non-zero",
        }),
        Ok(w) => Ok(w),
        Err(_) => Err(CompileError::InvalidWidth {
            loc: location(pair),
            width,
            reason: "width is too large",
        }),
    }
}

fn parse_string(pair: &Pair<Rule>) -> Result<String> {
    let raw = child(pair, Rule::string_inner)
        .map(|p| p.as_str())
        .unwrap_or_default();
    unescape(raw, location(pair))
}

/// Resolve `\\`, `\"`, `\n`, `\t`, `\r`, `\0` and `\xHH` escapes.
fn unescape(raw: &str, loc: Location) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let byte = u8::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 2)
                    .ok_or_else(|| {
                        CompileError::invalid_field(loc, format!("invalid escape `\\x{}`", hex))
                    })?;
                out.push(char::from(byte));
            }
            Some(other) => {
                return Err(CompileError::invalid_field(
                    loc,
                    format!("unknown escape `\\{}`", other),
                ))
            }
            None => return Err(CompileError::invalid_field(loc, "dangling `\\` in string")),
        }
    }
    Ok(out)
}

// ==================== Declarations ====================

fn build_endianness(pair: Pair<Rule>) -> Result<Endianness> {
    let loc = location(&pair);
    match pair.into_inner().next().map(|p| p.as_rule()) {
        Some(Rule::kw_little_endian) => Ok(Endianness::Little),
        Some(Rule::kw_big_endian) => Ok(Endianness::Big),
        _ => Err(missing(loc, "endianness declaration")),
    }
}

fn build_enum(pair: Pair<Rule>) -> Result<EnumDef> {
    let loc = location(&pair);
    let mut name = String::new();
    let mut width = 0;
    let mut tags: BTreeMap<u64, String> = BTreeMap::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::identifier => name = inner.as_str().to_string(),
            Rule::integer => width = scalar_width(&inner)?,
            Rule::enumerator => {
                let tag_loc = location(&inner);
                let mut it = inner.into_inner();
                let tag = next_pair(&mut it, tag_loc, "enumerator name")?
                    .as_str()
                    .to_string();
                let value = parse_integer(&next_pair(&mut it, tag_loc, "enumerator value")?)?;
                check_fits(value, width, tag_loc)?;
                if tags.values().any(|t| *t == tag) {
                    return Err(CompileError::DuplicateEnumTag {
                        loc: tag_loc,
                        enum_id: name,
                        tag,
                    });
                }
                if let Some(previous) = tags.get(&value) {
                    return Err(CompileError::DuplicateEnumValue {
                        loc: tag_loc,
                        enum_id: name,
                        value,
                        tag,
                        previous: previous.clone(),
                    });
                }
                tags.insert(value, tag);
            }
            _ => {}
        }
    }
    Ok(EnumDef {
        name,
        width,
        tags,
        loc,
    })
}

fn build_custom_field(pair: Pair<Rule>) -> Result<CustomFieldDef> {
    let loc = location(&pair);
    let name = required(&pair, Rule::identifier, "custom field name")?;
    let width = child(&pair, Rule::integer)
        .map(|p| region_width(&p))
        .transpose()?;
    let backing = parse_string(&required(&pair, Rule::string, "backing class name")?)?;
    Ok(CustomFieldDef {
        name: name.as_str().to_string(),
        width,
        backing,
        loc,
    })
}

fn build_checksum(pair: Pair<Rule>) -> Result<ChecksumDef> {
    let loc = location(&pair);
    let name = required(&pair, Rule::identifier, "checksum name")?;
    let width = region_width(&required(&pair, Rule::integer, "checksum width")?)?;
    let backing = parse_string(&required(&pair, Rule::string, "backing class name")?)?;
    Ok(ChecksumDef {
        name: name.as_str().to_string(),
        width,
        backing,
        loc,
    })
}

fn build_group(pair: Pair<Rule>, decls: &Declarations) -> Result<GroupDef> {
    let loc = location(&pair);
    let name = required(&pair, Rule::identifier, "group name")?
        .as_str()
        .to_string();
    let fields = build_field_list(required(&pair, Rule::field_list, "field list")?, decls)?;
    check_unique_names(&name, &fields)?;
    Ok(GroupDef { name, fields, loc })
}

fn build_record(pair: Pair<Rule>, decls: &Declarations, kind: RecordKind) -> Result<RecordDef> {
    let loc = location(&pair);
    let name = required(&pair, Rule::identifier, "name")?.as_str().to_string();
    let parent = child(&pair, Rule::parent)
        .map(|p| build_parent(&p))
        .transpose()?;
    let fields = build_field_list(required(&pair, Rule::field_list, "field list")?, decls)?;
    resolve_record(decls, kind, &name, loc, parent, fields)
}

fn build_parent(pair: &Pair<Rule>) -> Result<ParentSpec> {
    let ident = required(pair, Rule::identifier, "parent name")?;
    let constraints = children(pair, Rule::constraint)
        .map(|c| build_constraint(&c))
        .collect::<Result<Vec<_>>>()?;
    Ok(ParentSpec {
        name: ident.as_str().to_string(),
        constraints,
        loc: location(&ident),
    })
}

fn build_constraint(pair: &Pair<Rule>) -> Result<Constraint> {
    let loc = location(pair);
    let mut it = pair.clone().into_inner();
    let field = next_pair(&mut it, loc, "constrained field")?.as_str().to_string();
    let value_pair = next_pair(&mut it, loc, "constraint value")?;
    let value = match value_pair.as_rule() {
        Rule::integer => ConstraintValue::Int(parse_integer(&value_pair)?),
        _ => ConstraintValue::Tag(value_pair.as_str().to_string()),
    };
    Ok(Constraint { field, value, loc })
}

fn build_tests(pair: Pair<Rule>, decls: &mut Declarations) -> Result<()> {
    let ident = required(&pair, Rule::identifier, "packet name")?;
    let cases = children(&pair, Rule::string)
        .map(|s| parse_string(&s))
        .collect::<Result<Vec<_>>>()?;
    decls.add_test_cases(ident.as_str(), cases, location(&ident))
}

// ==================== Fields ====================

/// Build the fields in source order, then assemble the list back to front so
/// that group fields are inlined where they appear.
fn build_field_list(pair: Pair<Rule>, decls: &Declarations) -> Result<Vec<PacketField>> {
    let fields = pair
        .into_inner()
        .map(|p| build_field(p, decls))
        .collect::<Result<Vec<_>>>()?;
    let mut list = FieldList::new();
    for field in fields.into_iter().rev() {
        list.prepend(field, decls)?;
    }
    Ok(list.into_vec())
}

fn build_field(pair: Pair<Rule>, decls: &Declarations) -> Result<PacketField> {
    let loc = location(&pair);
    let kind = match pair.as_rule() {
        Rule::body_field => FieldKind::Body,
        Rule::payload_field => FieldKind::Payload {
            size_modifier: child(&pair, Rule::size_modifier).map(|p| p.as_str().to_string()),
        },
        Rule::checksum_start_field => FieldKind::ChecksumStart {
            field: required(&pair, Rule::identifier, "checksum field name")?
                .as_str()
                .to_string(),
        },
        Rule::padding_field => {
            let n = required(&pair, Rule::integer, "padding size")?;
            let octets = parse_integer(&n)?;
            match u32::try_from(octets) {
                Ok(octets) if octets > 0 => FieldKind::Padding { octets },
                _ => {
                    return Err(CompileError::invalid_field(
                        location(&n),
                        format!("invalid padding size {}", octets),
                    ))
                }
            }
        }
        Rule::size_field => {
            let target = required(&pair, Rule::size_target, "size target")?;
            let target = match target.into_inner().next() {
                Some(p) if p.as_rule() == Rule::kw_payload => "payload".to_string(),
                Some(p) if p.as_rule() == Rule::kw_body => "body".to_string(),
                Some(p) => p.as_str().to_string(),
                None => return Err(missing(loc, "size target")),
            };
            FieldKind::Size {
                target,
                width: scalar_width(&required(&pair, Rule::integer, "size width")?)?,
            }
        }
        Rule::count_field => FieldKind::Count {
            target: required(&pair, Rule::identifier, "count target")?
                .as_str()
                .to_string(),
            width: scalar_width(&required(&pair, Rule::integer, "count width")?)?,
        },
        Rule::fixed_field => build_fixed(&pair, decls)?,
        Rule::reserved_field => FieldKind::Reserved {
            width: region_width(&required(&pair, Rule::integer, "reserved width")?)?,
        },
        Rule::typed_field => return build_typed_field(pair, decls),
        Rule::group_field => FieldKind::Group {
            group_id: required(&pair, Rule::identifier, "group name")?
                .as_str()
                .to_string(),
            constraints: children(&pair, Rule::constraint)
                .map(|c| build_constraint(&c))
                .collect::<Result<Vec<_>>>()?,
        },
        other => return Err(missing(loc, &format!("field (found {:?})", other))),
    };
    Ok(PacketField::new(kind, loc))
}

fn build_fixed(pair: &Pair<Rule>, decls: &Declarations) -> Result<FieldKind> {
    if let Some(scalar) = child(pair, Rule::fixed_scalar) {
        let loc = location(&scalar);
        let mut it = scalar.into_inner();
        let value = parse_integer(&next_pair(&mut it, loc, "fixed value")?)?;
        let width = scalar_width(&next_pair(&mut it, loc, "fixed width")?)?;
        check_fits(value, width, loc)?;
        return Ok(FieldKind::FixedScalar {
            name: None,
            value,
            width,
        });
    }
    let fixed = required(pair, Rule::fixed_enum, "fixed value")?;
    let loc = location(&fixed);
    let mut it = fixed.into_inner();
    let tag = next_pair(&mut it, loc, "enumerator")?.as_str().to_string();
    let enum_pair = next_pair(&mut it, loc, "enum type")?;
    let enum_id = enum_pair.as_str();
    let def = decls
        .get_enum(enum_id)
        .ok_or_else(|| decls.lookup_error(enum_id, "enum", location(&enum_pair)))?;
    if !def.has_tag(&tag) {
        return Err(CompileError::UndeclaredTag {
            loc,
            enum_id: enum_id.to_string(),
            tag,
        });
    }
    Ok(FieldKind::FixedEnum {
        name: None,
        enum_id: enum_id.to_string(),
        tag,
        width: def.width,
    })
}

/// `name : 8`, `name : Type`, and their array (`[n]`) and vector (`[]`,
/// `[+modifier]`) forms.
fn build_typed_field(pair: Pair<Rule>, decls: &Declarations) -> Result<PacketField> {
    let loc = location(&pair);
    let mut it = pair.into_inner();
    let name = next_pair(&mut it, loc, "field name")?.as_str().to_string();
    let ty = next_pair(&mut it, loc, "field type")?;
    let ty_loc = location(&ty);

    let suffix = match it.next() {
        Some(suffix) => suffix,
        None if ty.as_rule() == Rule::integer => {
            let width = scalar_width(&ty)?;
            return Ok(PacketField::new(FieldKind::Scalar { name, width }, loc));
        }
        None => return Ok(decls.resolve_type(ty.as_str(), ty_loc)?.new_field(name, loc)),
    };

    let element = match ty.as_rule() {
        Rule::integer => ElementType::Scalar(scalar_width(&ty)?),
        _ => decls.resolve_type(ty.as_str(), ty_loc)?.element_type(ty_loc)?,
    };
    let kind = match suffix.into_inner().next() {
        None => FieldKind::Vector {
            name,
            element,
            size_modifier: None,
        },
        Some(m) if m.as_rule() == Rule::size_modifier => FieldKind::Vector {
            name,
            element,
            size_modifier: Some(m.as_str().to_string()),
        },
        Some(n) => {
            let count = parse_integer(&n)?;
            if count == 0 {
                return Err(CompileError::invalid_field(
                    location(&n),
                    format!("array `{}` must have at least one element", name),
                ));
            }
            FieldKind::Array {
                name,
                element,
                count,
            }
        }
    };
    Ok(PacketField::new(kind, loc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> Location {
        Location { line: 1, column: 1 }
    }

    #[test]
    fn unescape_handles_common_escapes() {
        assert_eq!(unescape(r#"a\"b\\c"#, at()).unwrap(), "a\"b\\c");
        assert_eq!(unescape(r"\x41\x42", at()).unwrap(), "AB");
        assert_eq!(unescape("plain", at()).unwrap(), "plain");
    }

    #[test]
    fn unescape_rejects_bad_escapes() {
        assert!(unescape(r"\q", at()).is_err());
        assert!(unescape(r"\x4", at()).is_err());
        assert!(unescape(r"\xZZ", at()).is_err());
    }

    #[test]
    fn hex_and_decimal_integers() {
        let decls = compile(
            "little_endian_packets\nenum E : 16 { A = 0x10, B = 17, C = 0XFF }",
        )
        .expect("compile");
        let e = decls.get_enum("E").expect("enum");
        assert_eq!(e.value_of("A"), Some(16));
        assert_eq!(e.value_of("B"), Some(17));
        assert_eq!(e.value_of("C"), Some(255));
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = compile("little_endian_packets\npacket P { fixed = 99999999999999999999 : 8 }")
            .unwrap_err();
        assert!(matches!(err, CompileError::IntegerOverflow { .. }));
    }

    #[test]
    fn syntax_error_has_location() {
        let err = compile("little_endian_packets\npacket P {\n  x : 8 y : 8\n}").unwrap_err();
        match err {
            CompileError::Syntax { loc, .. } => assert_eq!(loc.line, 3),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
