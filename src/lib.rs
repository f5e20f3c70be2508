//! # packetgen — Packet Description Language front end
//!
//! Compiles a schema of binary packet formats (enums, custom field types,
//! checksums, field groups, structs and packets with single inheritance) into
//! a checked, fully resolved set of [`Declarations`] that a code generator can
//! consume without further validation.
//!
//! ## Pipeline
//!
//! - **Parse**: a PEST grammar checks the whole file.
//! - **Declare**: each top-level declaration, in textual order, is resolved
//!   against what came before it and committed to the registry.
//! - **Expand**: group fields are inlined, with constrained members fixed.
//! - **Inherit**: a child's visible fields are its parent's, with the parent's
//!   `body`/`payload` replaced by the child's own fields.
//! - **Lay out**: every visible field is sized, static bit offsets are
//!   computed and `size`/`count`/`checksum_start` fields are bound.
//!
//! Compilation stops at the first error; every [`CompileError`] carries the
//! line and column of the offending construct.
//!
//! ## Example schema
//!
//! ```text
//! little_endian_packets
//!
//! enum OpCode : 8 {
//!   READ = 0x01,
//!   WRITE = 0x02,
//! }
//!
//! packet Command {
//!   op : OpCode,
//!   _reserved_ : 8,
//!   size(payload) : 16,
//!   payload,
//! }
//!
//! packet Write : Command (op = WRITE) {
//!   address : 32,
//!   data : 8[],
//! }
//! ```
//!
//! ## Usage
//!
//! ```
//! let decls = packetgen::compile("little_endian_packets\npacket P { a : 8, b : 16 }")?;
//! let p = decls.get_packet("P").expect("declared");
//! assert_eq!(p.layout.total_bits(), Some(24));
//! # Ok::<(), packetgen::CompileError>(())
//! ```

pub mod ast;
pub mod decls;
pub mod dump;
pub mod error;
pub mod group;
pub mod inherit;
pub mod layout;
pub mod parser;

pub use ast::{
    Constraint, ConstraintValue, ElementType, Endianness, EnumDef, FieldKind, GroupDef, Location,
    PacketDef, PacketField, RecordDef, StructDef, TypeDef,
};
pub use decls::Declarations;
pub use dump::dump;
pub use error::{CompileError, Diagnostic, Result};
pub use layout::{Layout, ResolvedField, Size};
pub use parser::compile;
