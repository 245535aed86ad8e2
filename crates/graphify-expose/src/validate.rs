//! Shape checks for documents written through an exposed resource.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use graphify_core::{FieldKind, ScalarKind, TypeDescriptor};

/// Check `fields` against `descriptor`. Returns a human-readable reason on
/// the first mismatch.
///
/// Undeclared and `_`-prefixed members are rejected. Non-optional fields
/// must be present and non-null.
pub fn check_fields(descriptor: &TypeDescriptor, fields: &Map<String, Value>) -> Result<(), String> {
    for name in fields.keys() {
        if name.starts_with('_') {
            return Err(format!("field '{name}' is reserved"));
        }
        if descriptor.field_named(name).is_none() {
            return Err(format!("field '{name}' is not declared"));
        }
    }

    for field in &descriptor.fields {
        match fields.get(&field.name) {
            None | Some(Value::Null) if field.optional => {}
            None | Some(Value::Null) => {
                return Err(format!("field '{}' is required", field.name));
            }
            Some(value) => {
                check_value(&field.kind, value)
                    .map_err(|expected| format!("field '{}' expects {expected}", field.name))?;
            }
        }
    }
    Ok(())
}

fn check_value(kind: &FieldKind, value: &Value) -> Result<(), String> {
    let ok = match kind {
        FieldKind::Scalar { scalar } => scalar_matches(*scalar, value),
        FieldKind::Geo => value
            .as_object()
            .is_some_and(|o| {
                o.get("latitude").is_some_and(Value::is_number)
                    && o.get("longitude").is_some_and(Value::is_number)
            }),
        FieldKind::Reference { .. } => value.is_string(),
        FieldKind::Nested { descriptor } => {
            let Some(object) = value.as_object() else {
                return Err(format!("an object ({})", descriptor.name));
            };
            return check_fields(descriptor, object);
        }
        FieldKind::List { item } => {
            let Some(items) = value.as_array() else {
                return Err(format!("a list of {item}"));
            };
            return items.iter().try_for_each(|v| check_value(item, v));
        }
        FieldKind::Opaque { rust_type } => return Err(format!("nothing (opaque {rust_type})")),
    };
    if ok {
        Ok(())
    } else {
        Err(kind.to_string())
    }
}

fn scalar_matches(scalar: ScalarKind, value: &Value) -> bool {
    match scalar {
        ScalarKind::String => value.is_string(),
        ScalarKind::Int => value.is_i64(),
        ScalarKind::UInt => value.is_u64(),
        ScalarKind::Float => value.is_number(),
        ScalarKind::Bool => value.is_boolean(),
        ScalarKind::Timestamp => value
            .as_str()
            .is_some_and(|s| s.parse::<DateTime<Utc>>().is_ok()),
        ScalarKind::Json => true,
    }
}
