//! Compile packet schema files and report the first error in each.
//!
//! Usage:
//!   check_schema [OPTIONS] [FILE.pdl ...]
//!   check_schema < file.pdl
//!
//! Options:
//!   --dump, -d    Print the resolved declarations of each schema that compiles
//!   --quiet, -q   No per-file summary line
//!
//! If no files are given, reads from stdin. Exits with status 1 if any schema
//! fails to compile or cannot be read. Set `PACKETGEN_LOG` (e.g. `debug`) to
//! trace the compiler.

use packetgen::{compile, dump, Declarations, Diagnostic};
use std::io::{self, Read};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy)]
struct Options {
    dump: bool,
    quiet: bool,
}

fn take_flag(args: &mut Vec<String>, long: &str, short: &str) -> bool {
    match args.iter().position(|a| a == long || a == short) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("PACKETGEN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn summary(path: &str, decls: &Declarations) -> String {
    let tests: usize = decls.packets().map(|p| p.tests.len()).sum();
    format!(
        "{}: ok ({} types, {} groups, {} packets, {} test cases)",
        path,
        decls.types().count(),
        decls.groups().count(),
        decls.packets().count(),
        tests
    )
}

/// Compile one schema, printing its summary or diagnostic. Returns whether it
/// compiled.
fn check(path: &str, src: &str, opts: Options) -> bool {
    match compile(src) {
        Ok(decls) => {
            tracing::info!(path, "compiled");
            if opts.dump {
                print!("{}", dump(&decls));
            }
            if !opts.quiet {
                println!("{}", summary(path, &decls));
            }
            true
        }
        Err(e) => {
            eprintln!("{}", Diagnostic::new(path, &e).render(src));
            false
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let opts = Options {
        dump: take_flag(&mut args, "--dump", "-d"),
        quiet: take_flag(&mut args, "--quiet", "-q"),
    };

    let mut failed = 0usize;
    if args.is_empty() {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        if !check("<stdin>", &src, opts) {
            failed += 1;
        }
    } else {
        for path in &args {
            let display_path = Path::new(path).display().to_string();
            let src = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("{}: {}", display_path, e);
                    failed += 1;
                    continue;
                }
            };
            if !check(&display_path, &src, opts) {
                failed += 1;
            }
        }
    }

    if failed > 0 {
        if !opts.quiet {
            eprintln!("check_schema: {} schema(s) failed", failed);
        }
        std::process::exit(1);
    }
    Ok(())
}
