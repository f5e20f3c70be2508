//! Inheritance: bind a struct or packet to its parent, apply the parent
//! constraints, and lay out the resulting record.
//!
//! A child's visible fields are its parent's visible fields with the parent's
//! `body`/`payload` replaced by the child's own fields. Parent constraints fix
//! inherited scalar and enum fields to a value shared by every instance of
//! the child.

use crate::ast::*;
use crate::decls::Declarations;
use crate::error::{CompileError, Result};
use crate::group::{check_unique_keys, specialize};
use crate::layout::{assign_size_fields, ResolvedField};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Struct,
    Packet,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Struct => "struct",
            RecordKind::Packet => "packet",
        }
    }
}

/// `: Parent (field = value, ...)` as written on a struct or packet.
#[derive(Debug, Clone)]
pub struct ParentSpec {
    pub name: String,
    pub constraints: Vec<Constraint>,
    pub loc: Location,
}

/// Build the record `name` from its own fields and optional parent.
pub fn resolve_record(
    decls: &Declarations,
    kind: RecordKind,
    name: &str,
    loc: Location,
    parent: Option<ParentSpec>,
    fields: Vec<PacketField>,
) -> Result<RecordDef> {
    check_single_payload(name, &fields)?;

    let own = fields.iter().cloned().map(|f| (f, name.to_string()));
    let (visible, parent_name, constraints) = match parent {
        None => (own.collect::<Vec<_>>(), None, Vec::new()),
        Some(spec) => {
            let inherited = parent_fields(decls, kind, &spec)?;
            let visible = inherit_fields(decls, name, &spec, inherited, own.collect())?;
            (visible, Some(spec.name), spec.constraints)
        }
    };
    check_unique_names(name, visible.iter().map(|(f, _)| f))?;

    let layout = assign_size_fields(decls, name, visible)?;
    Ok(RecordDef {
        name: name.to_string(),
        fields,
        parent: parent_name,
        constraints,
        layout,
        loc,
    })
}

/// The parent's visible fields. The parent must be declared and of the same
/// kind as the child.
fn parent_fields<'d>(
    decls: &'d Declarations,
    kind: RecordKind,
    spec: &ParentSpec,
) -> Result<&'d [ResolvedField]> {
    let parent = match kind {
        RecordKind::Packet => decls.get_packet(&spec.name).map(|p| &p.record),
        RecordKind::Struct => decls.get_struct(&spec.name),
    };
    let parent = parent.ok_or_else(|| decls.lookup_error(&spec.name, kind.as_str(), spec.loc))?;
    tracing::trace!(parent = %parent.name, kind = kind.as_str(), "bound parent");
    Ok(&parent.layout.fields)
}

/// Splice the child's fields into the parent's payload slot and fix the
/// constrained inherited fields.
fn inherit_fields(
    decls: &Declarations,
    record: &str,
    spec: &ParentSpec,
    inherited: &[ResolvedField],
    own: Vec<(PacketField, String)>,
) -> Result<Vec<(PacketField, String)>> {
    let slot = inherited
        .iter()
        .position(|f| f.field.is_payload_or_body())
        .ok_or_else(|| CompileError::MissingPayload {
            loc: spec.loc,
            record: record.to_string(),
            parent: spec.name.clone(),
        })?;

    check_unique_keys(&spec.constraints)?;
    let mut used = HashSet::new();
    let mut visible = Vec::with_capacity(inherited.len() - 1 + own.len());
    let mut own = Some(own);

    for (i, resolved) in inherited.iter().enumerate() {
        if i == slot {
            visible.extend(own.take().into_iter().flatten());
            continue;
        }
        let field = &resolved.field;
        let constraint = field
            .name()
            .and_then(|n| spec.constraints.iter().find(|c| c.field == n));
        let field = match constraint {
            Some(c) if field.is_fixed() => {
                return Err(CompileError::DuplicateConstraint {
                    loc: c.loc,
                    field: c.field.clone(),
                })
            }
            Some(c) => {
                used.insert(c.field.as_str());
                specialize(decls, field, c)?
            }
            None => field.clone(),
        };
        visible.push((field, resolved.origin.clone()));
    }

    if let Some(c) = spec
        .constraints
        .iter()
        .find(|c| !used.contains(c.field.as_str()))
    {
        return Err(CompileError::UnknownConstraintField {
            loc: c.loc,
            record: record.to_string(),
            field: c.field.clone(),
        });
    }
    Ok(visible)
}

fn check_single_payload(record: &str, fields: &[PacketField]) -> Result<()> {
    let mut payloads = fields.iter().filter(|f| f.is_payload_or_body());
    match (payloads.next(), payloads.next()) {
        (Some(_), Some(second)) => Err(CompileError::DuplicatePayload {
            loc: second.loc,
            record: record.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Field names must be unique across the visible list.
pub(crate) fn check_unique_names<'a>(
    record: &str,
    fields: impl IntoIterator<Item = &'a PacketField>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if let Some(name) = field.name() {
            if !seen.insert(name) {
                return Err(CompileError::DuplicateField {
                    loc: field.loc,
                    record: record.to_string(),
                    field: name.to_string(),
                });
            }
        }
    }
    Ok(())
}
