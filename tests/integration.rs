//! End-to-end tests: complete schemas through `compile`, and the
//! `check_schema` binary driven over schema files.

use packetgen::{compile, dump, CompileError, ConstraintValue, FieldKind, Size};
use std::io::Write;
use std::process::{Command, Output, Stdio};

const PIXEL: &str = r#"
little_endian_packets

enum Color : 8 {
  RED = 0,
  GREEN = 1,
}

packet Pixel {
  c : Color,
  x : 16,
  y : 16,
}
"#;

#[test]
fn test_pixel_layout() {
    let decls = compile(PIXEL).expect("compile");
    let pixel = decls.get_packet("Pixel").expect("packet");
    let names: Vec<&str> = pixel
        .layout
        .fields
        .iter()
        .filter_map(|f| f.field.name())
        .collect();
    assert_eq!(names, vec!["c", "x", "y"]);
    assert!(matches!(
        pixel.layout.fields[0].field.kind,
        FieldKind::Enum { ref enum_id, width: 8, .. } if enum_id == "Color"
    ));
    let offsets: Vec<Option<u64>> = pixel.layout.fields.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, vec![Some(0), Some(8), Some(24)]);
    assert_eq!(pixel.layout.size, Size::Static(40));
    assert!(pixel.is_fixed_size());
}

#[test]
fn test_child_with_constrained_parent() {
    let src = r#"
little_endian_packets
packet Parent { op : 8, payload }
packet Child : Parent (op = 5) { extra : 8 }
"#;
    let decls = compile(src).expect("compile");
    let child = decls.get_packet("Child").expect("packet");
    assert_eq!(child.parent.as_deref(), Some("Parent"));
    assert_eq!(child.constraints.len(), 1);
    assert_eq!(child.constraints[0].value, ConstraintValue::Int(5));
    assert_eq!(child.fields.len(), 1);
    assert_eq!(
        child.layout.fields[0].field.kind,
        FieldKind::FixedScalar {
            name: Some("op".to_string()),
            value: 5,
            width: 8
        }
    );
    assert_eq!(child.layout.fields[0].origin, "Parent");
    assert_eq!(child.layout.fields[1].field.name(), Some("extra"));
    assert_eq!(child.layout.fields[1].origin, "Child");
    assert_eq!(child.layout.size, Size::Static(16));

    // The parent is unchanged by its child.
    let parent = decls.get_packet("Parent").expect("packet");
    assert!(matches!(parent.layout.fields[0].field.kind, FieldKind::Scalar { .. }));
}

#[test]
fn test_unknown_parent() {
    let e = compile("little_endian_packets\npacket Child : Nobody { a : 8 }").unwrap_err();
    assert!(matches!(
        e,
        CompileError::Undeclared { kind: "packet", ref name, .. } if name == "Nobody"
    ));
}

#[test]
fn test_struct_parent_of_packet() {
    let e =
        compile("little_endian_packets\nstruct S { body }\npacket P : S { a : 8 }").unwrap_err();
    assert!(matches!(e, CompileError::KindMismatch { .. }));
}

#[test]
fn test_group_expansion_order() {
    let src = r#"
little_endian_packets
group Abc { a : 8, b : 8, c : 8 }
packet Plain { Abc }
packet Fixed { Abc(b = 7) }
"#;
    let decls = compile(src).expect("compile");
    let rendered = |name: &str| -> Vec<String> {
        let packet = decls.get_packet(name).expect("packet");
        packet.fields.iter().map(|f| f.to_string()).collect()
    };
    let plain = rendered("Plain");
    assert_eq!(plain, vec!["a : 8", "b : 8", "c : 8"]);
    let fixed = rendered("Fixed");
    assert_eq!(fixed, vec!["a : 8", "fixed b = 7 : 8", "c : 8"]);
}

#[test]
fn test_field_lists_keep_declaration_order() {
    let decls =
        compile("big_endian_packets\npacket P { z : 8, a : 8, m : 8, b : 8 }").expect("compile");
    let names: Vec<&str> = decls
        .get_packet("P")
        .expect("packet")
        .fields
        .iter()
        .filter_map(|f| f.name())
        .collect();
    assert_eq!(names, vec!["z", "a", "m", "b"]);
}

#[test]
fn test_test_blocks_accumulate() {
    let src = format!(
        "{}\ntest Pixel {{ \"000100\" }}\ntest Pixel {{ \"010203\", \"000100\" }}\n",
        PIXEL
    );
    let decls = compile(&src).expect("compile");
    let tests = &decls.get_packet("Pixel").expect("packet").tests;
    assert_eq!(tests.len(), 2);
    assert!(tests.contains("000100"));
    assert!(tests.contains("010203"));
}

#[test]
fn test_test_on_undeclared_packet() {
    let e = compile("little_endian_packets\ntest Missing { \"00\" }").unwrap_err();
    assert!(matches!(e, CompileError::Undeclared { kind: "packet", .. }));
}

#[test]
fn test_duplicate_enum_values_fail() {
    let e = compile("little_endian_packets\nenum E : 8 { A = 0, B = 0 }").unwrap_err();
    assert!(matches!(e, CompileError::DuplicateEnumValue { .. }));
}

#[test]
fn test_references_resolve_or_fail() {
    let good = r#"
little_endian_packets
checksum Crc : 8 "Xor8"
packet P {
  checksum_start(crc),
  count(items) : 8,
  size(payload) : 8,
  items : 16[],
  payload,
  crc : Crc,
}
"#;
    let decls = compile(good).expect("compile");
    let p = decls.get_packet("P").expect("packet");
    for resolved in &p.layout.fields {
        let reference = matches!(
            resolved.field.kind,
            FieldKind::Size { .. } | FieldKind::Count { .. } | FieldKind::ChecksumStart { .. }
        );
        if reference {
            let target = resolved.target.expect("bound reference");
            assert!(p.layout.fields[target].sized_by.is_some());
        }
    }

    let bad = good.replace("count(items)", "count(itemz)");
    let e = compile(&bad).unwrap_err();
    assert!(matches!(e, CompileError::UnresolvedReference { ref target, .. } if target == "itemz"));
}

#[test]
fn test_redeclaration_reports_both_locations() {
    let e = compile("little_endian_packets\nstruct A { a : 8 }\ngroup A { b : 8 }").unwrap_err();
    assert_eq!(e.to_string(), "3:1: redeclaration of `A` (first declared at 2:1)");
}

#[test]
fn test_protocol_family() {
    // A small command protocol: a common header, a shared trailer group and
    // one packet per opcode.
    let src = r#"
big_endian_packets

enum OpCode : 8 {
  READ = 0x01,
  WRITE = 0x02,
  STATUS = 0x03,
}

enum Status : 8 { OK = 0, BUSY = 1, ERROR = 0xff }

checksum Crc16 : 16 "Crc16Ccitt"

group Trailer { checksum_start(crc), crc : Crc16 }

struct Register { address : 16, value : 32 }

packet Command {
  version : 4,
  fixed = 0 : 4,
  op : OpCode,
  size(payload) : 16,
  payload,
}

packet Read : Command (version = 1, op = READ) {
  address : 16,
  Trailer,
}

packet Write : Command (version = 1, op = WRITE) {
  count(registers) : 8,
  registers : Register[],
  Trailer,
}

packet Reply : Command (version = 1, op = STATUS) {
  status : Status,
  reserved : 7,
  more : 1,
}

test Read { "\x10\x01\x00\x04\x00\x20\xbe\xef" }
test Write { "\x10\x02\x00\x00" }
"#;
    let decls = compile(src).expect("compile");
    assert_eq!(decls.packets().count(), 4);
    assert_eq!(decls.types().count(), 4);
    assert_eq!(decls.groups().count(), 1);

    let read = decls.get_packet("Read").expect("read");
    assert_eq!(read.layout.size, Size::Static(16 + 16 + 16 + 16));
    assert_eq!(read.layout.field("crc").expect("crc").offset, Some(48));
    assert_eq!(read.tests.len(), 1);

    let write = decls.get_packet("Write").expect("write");
    assert!(!write.is_fixed_size());
    assert_eq!(write.layout.field("registers").expect("registers").sized_by, Some(4));

    let reply = decls.get_packet("Reply").expect("reply");
    assert!(reply.is_fixed_size());
    assert!(matches!(
        reply.layout.fields[2].field.kind,
        FieldKind::FixedEnum { ref tag, .. } if tag == "STATUS"
    ));

    let text = dump(&decls);
    assert!(text.starts_with("big_endian_packets\n"));
    assert!(text.contains("packet Write : Command (version = 1, op = WRITE)"));
}

// ==================== check_schema binary ====================

fn schema_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".pdl")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write schema");
    file.flush().expect("flush schema");
    file
}

fn check_schema(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_check_schema"))
        .args(args)
        .output()
        .expect("run check_schema")
}

#[test]
fn test_cli_accepts_valid_schema() {
    let file = schema_file(PIXEL);
    let path = file.path().to_str().expect("utf-8 path");
    let out = check_schema(&[path]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(": ok (1 types, 0 groups, 1 packets, 0 test cases)"));
}

#[test]
fn test_cli_reports_diagnostic_and_fails() {
    let file = schema_file("little_endian_packets\npacket P { m : Missing }\n");
    let path = file.path().to_str().expect("utf-8 path");
    let out = check_schema(&[path]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains(&format!("{}:2:16: undeclared type `Missing`", path)));
    assert!(stderr.contains("2 | packet P { m : Missing }"));
    assert!(stderr.contains(&format!("  | {}^", " ".repeat(15))));
}

#[test]
fn test_cli_checks_every_file() {
    let bad = schema_file("little_endian_packets\npacket P {");
    let good = schema_file(PIXEL);
    let bad_path = bad.path().to_str().expect("utf-8 path");
    let good_path = good.path().to_str().expect("utf-8 path");
    let out = check_schema(&[bad_path, good_path]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(&format!("{}: ok", good_path)));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("syntax error"));
}

#[test]
fn test_cli_dump_and_quiet() {
    let file = schema_file(PIXEL);
    let path = file.path().to_str().expect("utf-8 path");
    let out = check_schema(&["--dump", "-q", path]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("little_endian_packets\n"));
    assert!(stdout.contains("packet Pixel {  // 40 bits"));
    assert!(!stdout.contains(": ok"));
}

#[test]
fn test_cli_missing_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.pdl");
    let out = check_schema(&[missing.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_cli_reads_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_check_schema"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn check_schema");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(PIXEL.as_bytes())
        .expect("write stdin");
    let out = child.wait_with_output().expect("wait");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("<stdin>: ok"));
}
