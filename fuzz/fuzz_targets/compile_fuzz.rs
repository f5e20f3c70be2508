//! Compiler fuzz target: feed arbitrary UTF-8 to `packetgen::compile`.
//! Compilation must not panic; it returns the declarations or the first error.
//! Build with: cargo fuzz run compile_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Err(e) = packetgen::compile(s) {
        // Rendering must cope with any location the compiler reports.
        let _ = packetgen::Diagnostic::new("fuzz", &e).render(s);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run compile_fuzz");
}
