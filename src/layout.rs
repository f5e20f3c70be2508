//! Layout assignment.
//!
//! Runs once per struct or packet, over the record's visible field list
//! (inherited fields first, groups inlined, parent constraints applied). It
//! sizes every field, computes static bit offsets where possible, and binds
//! `size`, `count` and `checksum_start` fields to the fields they describe.
//! Nothing here touches the registry except to read the size of nested
//! structs.

use crate::ast::*;
use crate::decls::Declarations;
use crate::error::{CompileError, Result};
use std::fmt;

/// Size of a field or record in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    /// Known when the schema is compiled.
    Static(u64),
    /// Known only when a packet is parsed, usually through a size or count
    /// field.
    Dynamic,
}

impl Size {
    /// `None` when the static sum does not fit in 64 bits.
    pub fn checked_add(self, rhs: Size) -> Option<Size> {
        match (self, rhs) {
            (Size::Static(lhs), Size::Static(rhs)) => lhs.checked_add(rhs).map(Size::Static),
            _ => Some(Size::Dynamic),
        }
    }

    /// `None` when the static product does not fit in 64 bits.
    pub fn checked_mul(self, rhs: u64) -> Option<Size> {
        match self {
            Size::Static(lhs) => lhs.checked_mul(rhs).map(Size::Static),
            Size::Dynamic => Some(Size::Dynamic),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Static(bits) => write!(f, "{} bits", bits),
            Size::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A field of a record's visible list, annotated for code generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub field: PacketField,
    /// Record that declared the field.
    pub origin: String,
    pub size: Size,
    /// Bit offset from the start of the record, when every field before it
    /// is statically sized.
    pub offset: Option<u64>,
    /// For `size`, `count` and `checksum_start`: index of the described field.
    pub target: Option<usize>,
    /// Index of the `size`/`count`/`checksum_start` field describing this one.
    pub sized_by: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub fields: Vec<ResolvedField>,
    pub size: Size,
}

impl Layout {
    pub fn is_fixed_size(&self) -> bool {
        matches!(self.size, Size::Static(_))
    }

    pub fn total_bits(&self) -> Option<u64> {
        match self.size {
            Size::Static(bits) => Some(bits),
            Size::Dynamic => None,
        }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.field.name() == Some(name))
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Index of the body or payload field, if the record has one.
    pub fn payload_position(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.field.is_payload_or_body())
    }
}

/// Lay out `record` from its visible fields, each paired with the name of the
/// record that declared it.
pub fn assign_size_fields(
    decls: &Declarations,
    record: &str,
    visible: Vec<(PacketField, String)>,
) -> Result<Layout> {
    let mut fields: Vec<ResolvedField> = Vec::with_capacity(visible.len());
    let mut cursor = Some(0u64);

    for (field, origin) in visible {
        let offset = cursor;
        let size = match &field.kind {
            FieldKind::Padding { octets } => {
                let padded = u64::from(*octets) * 8;
                let array = fields
                    .last()
                    .filter(|prev| {
                        matches!(
                            prev.field.kind,
                            FieldKind::Array { .. } | FieldKind::Vector { .. }
                        )
                    })
                    .ok_or_else(|| {
                        CompileError::invalid_field(
                            field.loc,
                            "padding must directly follow an array or vector field",
                        )
                    })?;
                let size = match array.size {
                    Size::Static(bits) if bits > padded => {
                        return Err(CompileError::invalid_field(
                            field.loc,
                            format!(
                                "`{}` occupies {} bits, more than the {} padded octets",
                                array.field.name().unwrap_or_default(),
                                bits,
                                octets
                            ),
                        ))
                    }
                    Size::Static(bits) => Size::Static(padded - bits),
                    Size::Dynamic => Size::Dynamic,
                };
                // The padded region ends at a known offset whenever it starts at one.
                cursor = array
                    .offset
                    .map(|start| start.checked_add(padded).ok_or_else(|| overflow(field.loc)))
                    .transpose()?;
                size
            }
            _ => {
                let size = field_size(decls, &field)?;
                cursor = match (cursor, size) {
                    (Some(at), Size::Static(bits)) => {
                        Some(at.checked_add(bits).ok_or_else(|| overflow(field.loc))?)
                    }
                    _ => None,
                };
                size
            }
        };
        fields.push(ResolvedField {
            field,
            origin,
            size,
            offset,
            target: None,
            sized_by: None,
        });
    }

    bind_references(record, &mut fields)?;

    let size = cursor.map_or(Size::Dynamic, Size::Static);
    tracing::debug!(record, %size, fields = fields.len(), "assigned layout");
    Ok(Layout { fields, size })
}

fn field_size(decls: &Declarations, field: &PacketField) -> Result<Size> {
    let size = match &field.kind {
        FieldKind::Scalar { width, .. }
        | FieldKind::Enum { width, .. }
        | FieldKind::Checksum { width, .. }
        | FieldKind::FixedScalar { width, .. }
        | FieldKind::FixedEnum { width, .. }
        | FieldKind::Size { width, .. }
        | FieldKind::Count { width, .. }
        | FieldKind::Reserved { width } => Size::Static(u64::from(*width)),
        FieldKind::Custom { width, .. } => width.map_or(Size::Dynamic, |w| Size::Static(w.into())),
        FieldKind::Struct { struct_id, .. } => struct_size(decls, struct_id, field.loc)?,
        FieldKind::Array { element, count, .. } => element_size(decls, element, field.loc)?
            .checked_mul(*count)
            .ok_or_else(|| overflow(field.loc))?,
        FieldKind::Vector { .. } | FieldKind::Body | FieldKind::Payload { .. } => Size::Dynamic,
        // Padding is sized against the preceding array by the caller.
        FieldKind::ChecksumStart { .. } | FieldKind::Padding { .. } => Size::Static(0),
        FieldKind::Group { group_id, .. } => {
            return Err(CompileError::invalid_field(
                field.loc,
                format!("group `{}` was not expanded", group_id),
            ))
        }
    };
    Ok(size)
}

fn overflow(loc: Location) -> CompileError {
    CompileError::invalid_field(loc, "record size overflows 64 bits")
}

fn element_size(decls: &Declarations, element: &ElementType, loc: Location) -> Result<Size> {
    Ok(match element {
        ElementType::Scalar(width) | ElementType::Enum { width, .. } => {
            Size::Static(u64::from(*width))
        }
        ElementType::Custom { width, .. } => {
            width.map_or(Size::Dynamic, |w| Size::Static(w.into()))
        }
        ElementType::Struct(id) => struct_size(decls, id, loc)?,
    })
}

fn struct_size(decls: &Declarations, struct_id: &str, loc: Location) -> Result<Size> {
    decls
        .get_struct(struct_id)
        .map(|def| def.layout.size)
        .ok_or_else(|| decls.lookup_error(struct_id, "struct", loc))
}

/// Index of the field described by `fields[i]`. `size(payload)` and
/// `size(body)` only match a payload declared by the same record: a child's
/// payload replaces the one an inherited size field was written for.
fn find_target(fields: &[ResolvedField], i: usize, target: &str) -> Option<usize> {
    let origin = &fields[i].origin;
    match (&fields[i].field.kind, target) {
        (FieldKind::Size { .. }, "payload") => fields.iter().position(|f| {
            matches!(f.field.kind, FieldKind::Payload { .. }) && f.origin == *origin
        }),
        (FieldKind::Size { .. }, "body") => fields
            .iter()
            .position(|f| matches!(f.field.kind, FieldKind::Body) && f.origin == *origin),
        _ => fields.iter().position(|f| f.field.name() == Some(target)),
    }
}

/// Bind every `size`, `count` and `checksum_start` field to its target.
///
/// References declared by `record` itself must resolve. Inherited ones may
/// lose their target when the child's fields replaced the parent's payload;
/// those stay unbound.
fn bind_references(record: &str, fields: &mut [ResolvedField]) -> Result<()> {
    for i in 0..fields.len() {
        let (kind, target) = match &fields[i].field.kind {
            FieldKind::Size { target, .. } => ("size", target.clone()),
            FieldKind::Count { target, .. } => ("count", target.clone()),
            FieldKind::ChecksumStart { field } => ("checksum_start", field.clone()),
            _ => continue,
        };
        let loc = fields[i].field.loc;

        let j = match find_target(fields, i, &target) {
            Some(j) => j,
            None if fields[i].origin == record => {
                return Err(CompileError::UnresolvedReference {
                    loc,
                    record: record.to_string(),
                    kind,
                    target,
                })
            }
            None => continue,
        };

        let described = &fields[j].field;
        let accepted = match kind {
            "size" => matches!(
                described.kind,
                FieldKind::Payload { .. } | FieldKind::Body | FieldKind::Vector { .. }
            ),
            "count" => matches!(described.kind, FieldKind::Vector { .. }),
            _ => matches!(described.kind, FieldKind::Checksum { .. }),
        };
        if !accepted {
            let message = match (&described.kind, kind) {
                (FieldKind::Array { count, .. }, "size" | "count") => format!(
                    "{} field for `{}` is redundant: the array has a fixed count of {}",
                    kind, target, count
                ),
                (other, "checksum_start") => format!(
                    "checksum_start must name a checksum field, `{}` is a {} field",
                    target,
                    other.kind_name()
                ),
                (other, _) => format!(
                    "{} field cannot describe `{}`, a {} field",
                    kind,
                    target,
                    other.kind_name()
                ),
            };
            return Err(CompileError::invalid_field(loc, message));
        }

        if let Some(previous) = fields[j].sized_by {
            return Err(CompileError::invalid_field(
                loc,
                format!(
                    "`{}` is already described by `{}`",
                    target, fields[previous].field
                ),
            ));
        }
        fields[j].sized_by = Some(i);
        fields[i].target = Some(j);
    }
    Ok(())
}
