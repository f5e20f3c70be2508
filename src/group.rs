//! Group expansion: inline a named field template at its point of use,
//! fixing the value of any member named by a constraint.

use crate::ast::*;
use crate::decls::Declarations;
use crate::error::{CompileError, Result};
use std::collections::HashSet;

/// Expand group `group_id` with `constraints` applied.
///
/// Fields are returned in the group's declared order. Every constraint must
/// name a member of the group.
pub fn expand(
    decls: &Declarations,
    group_id: &str,
    constraints: &[Constraint],
    loc: Location,
) -> Result<Vec<PacketField>> {
    let group = decls
        .get_group(group_id)
        .ok_or_else(|| decls.lookup_error(group_id, "group", loc))?;
    check_unique_keys(constraints)?;

    let mut used = HashSet::new();
    let mut fields = Vec::with_capacity(group.fields.len());
    for field in &group.fields {
        let constraint = field
            .name()
            .and_then(|name| constraints.iter().find(|c| c.field == name));
        match constraint {
            Some(c) => {
                used.insert(c.field.as_str());
                fields.push(specialize(decls, field, c)?);
            }
            None => fields.push(field.clone()),
        }
    }

    if let Some(c) = constraints.iter().find(|c| !used.contains(c.field.as_str())) {
        return Err(CompileError::UnknownMember {
            loc: c.loc,
            group_id: group_id.to_string(),
            member: c.field.clone(),
        });
    }

    tracing::trace!(
        group = group_id,
        fields = fields.len(),
        fixed = used.len(),
        "expanded group"
    );
    Ok(fields)
}

/// Reject a constraint list that names the same field twice.
pub(crate) fn check_unique_keys(constraints: &[Constraint]) -> Result<()> {
    let mut seen = HashSet::new();
    for c in constraints {
        if !seen.insert(c.field.as_str()) {
            return Err(CompileError::DuplicateConstraint {
                loc: c.loc,
                field: c.field.clone(),
            });
        }
    }
    Ok(())
}

/// Replace `field` by its fixed-value counterpart: a scalar takes an integer,
/// an enum takes one of its enumerators. The result keeps the field's name.
pub(crate) fn specialize(
    decls: &Declarations,
    field: &PacketField,
    constraint: &Constraint,
) -> Result<PacketField> {
    let invalid = |reason: String| CompileError::InvalidConstraint {
        loc: constraint.loc,
        field: constraint.field.clone(),
        reason,
    };
    let kind = match (&field.kind, &constraint.value) {
        (FieldKind::Scalar { name, width }, ConstraintValue::Int(value)) => {
            check_fits(*value, *width, constraint.loc)?;
            FieldKind::FixedScalar {
                name: Some(name.clone()),
                value: *value,
                width: *width,
            }
        }
        (FieldKind::Scalar { .. }, ConstraintValue::Tag(tag)) => {
            return Err(invalid(format!(
                "scalar field expects an integer value, found `{}`",
                tag
            )))
        }
        (
            FieldKind::Enum {
                name,
                enum_id,
                width,
            },
            ConstraintValue::Tag(tag),
        ) => {
            let def = decls
                .get_enum(enum_id)
                .ok_or_else(|| decls.lookup_error(enum_id, "enum", field.loc))?;
            if !def.has_tag(tag) {
                return Err(CompileError::UndeclaredTag {
                    loc: constraint.loc,
                    enum_id: enum_id.clone(),
                    tag: tag.clone(),
                });
            }
            FieldKind::FixedEnum {
                name: Some(name.clone()),
                enum_id: enum_id.clone(),
                tag: tag.clone(),
                width: *width,
            }
        }
        (FieldKind::Enum { enum_id, .. }, ConstraintValue::Int(value)) => {
            return Err(invalid(format!(
                "enum field expects an enumerator of `{}`, found {}",
                enum_id, value
            )))
        }
        (other, _) => {
            return Err(invalid(format!(
                "only scalar and enum fields can be fixed, found {} field",
                other.kind_name()
            )))
        }
    };
    Ok(PacketField::new(kind, field.loc))
}

/// `value` must be representable in `width` bits.
pub(crate) fn check_fits(value: u64, width: u32, loc: Location) -> Result<()> {
    if width >= 64 || value >> width == 0 {
        Ok(())
    } else {
        Err(CompileError::ValueOutOfRange { loc, value, width })
    }
}
