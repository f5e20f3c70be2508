//! Benchmark: compile a generated schema with many packets, each inheriting
//! from a common header, using shared groups and nested structs. Also times
//! the dump of the compiled declarations.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use packetgen::{compile, dump};
use std::fmt::Write;

/// A schema with `n` packets. Every packet derives from `Header` with its
/// opcode fixed, so inheritance and constraint resolution run once per packet.
fn generate_schema(n: usize) -> String {
    let mut src = String::from("big_endian_packets\n\n");
    src.push_str("enum OpCode : 16 {\n");
    for i in 0..n {
        let _ = writeln!(src, "  OP_{} = {},", i, i + 1);
    }
    src.push_str("}\n\n");
    src.push_str("checksum Crc16 : 16 \"Crc16\"\n");
    src.push_str("group Version { major : 4, minor : 4 }\n");
    src.push_str("struct Point { x : 16, y : 16 }\n");
    src.push_str("packet Header {\n");
    src.push_str("  Version(major = 1),\n  op : OpCode,\n  size(payload) : 16,\n  payload,\n}\n\n");
    for i in 0..n {
        let _ = writeln!(
            src,
            "packet Cmd{i} : Header (op = OP_{i}) {{\n  \
             checksum_start(crc),\n  \
             count(points) : 8,\n  \
             points : Point[],\n  \
             tag : 8[4],\n  \
             crc : Crc16,\n}}\n\
             test Cmd{i} {{ \"\\x00\\x01\" }}\n"
        );
    }
    src
}

fn bench_compile(c: &mut Criterion) {
    let small = generate_schema(16);
    let large = generate_schema(512);
    let decls = compile(&large).expect("generated schema compiles");
    eprintln!(
        "compile: {} bytes, {} packets (warm-up)",
        large.len(),
        decls.packets().count()
    );

    c.bench_function("compile_16_packets", |b| {
        b.iter(|| compile(black_box(&small)).map(|d| d.packets().count()))
    });

    c.bench_function("compile_512_packets", |b| {
        b.iter(|| compile(black_box(&large)).map(|d| d.packets().count()))
    });

    c.bench_function("dump_512_packets", |b| {
        b.iter(|| black_box(dump(black_box(&decls))).len())
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
