//! Explicit field enumeration and value-equality diffing.
//!
//! Each audited type lists its fields once in [`Auditable::audit_fields`]; diffs
//! compare those snapshots by value. The field set of a type is fixed, so a key
//! is present in both snapshots of the same type.

use serde::Serialize;
use serde_json::Value as JsonValue;

use hrgate_core::TenantId;

use crate::FieldMap;

/// A record whose mutations are captured in the audit trail.
pub trait Auditable {
    /// Stable entity type label stored on audit records.
    const ENTITY_TYPE: &'static str;

    /// Audit key of this instance; `None` until the store has assigned an id.
    fn audit_key(&self) -> Option<String>;

    /// Tenant the resulting audit record belongs to.
    fn audit_tenant(&self) -> Option<TenantId>;

    /// Snapshot of every audited field.
    fn audit_fields(&self) -> FieldMap;
}

/// Serialize one field value for a snapshot.
pub fn field_value<T: Serialize + ?Sized>(value: &T) -> JsonValue {
    serde_json::to_value(value).unwrap_or(JsonValue::Null)
}

/// Build a [`FieldMap`] from `"name" => value` pairs.
#[macro_export]
macro_rules! field_map {
    ($($name:literal => $value:expr),* $(,)?) => {{
        let mut fields = $crate::FieldMap::new();
        $(
            fields.insert(::std::string::String::from($name), $crate::diff::field_value(&$value));
        )*
        fields
    }};
}

/// Compute the changed-fields payload between two snapshots.
///
/// Returns `(old_values, new_values)` holding only fields whose values differ.
/// Unchanged fields are omitted entirely.
pub fn diff_fields(before: &FieldMap, after: &FieldMap) -> (FieldMap, FieldMap) {
    let mut old_values = FieldMap::new();
    let mut new_values = FieldMap::new();

    for (name, after_value) in after {
        let before_value = before.get(name).unwrap_or(&JsonValue::Null);
        if before_value != after_value {
            old_values.insert(name.clone(), before_value.clone());
            new_values.insert(name.clone(), after_value.clone());
        }
    }

    for (name, before_value) in before {
        if !after.contains_key(name) && !before_value.is_null() {
            old_values.insert(name.clone(), before_value.clone());
            new_values.insert(name.clone(), JsonValue::Null);
        }
    }

    (old_values, new_values)
}

/// Overwrite the fields named in `changes`, leaving every other field untouched.
pub fn replay(fields: &mut FieldMap, changes: &FieldMap) {
    for (name, value) in changes {
        fields.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn unchanged_fields_are_omitted() {
        let before = field_map! { "name" => "Payroll", "is_active" => true, "description" => "old" };
        let after = field_map! { "name" => "Payroll", "is_active" => false, "description" => "new" };

        let (old_values, new_values) = diff_fields(&before, &after);

        assert_eq!(old_values.len(), 2);
        assert_eq!(new_values.len(), 2);
        assert!(!old_values.contains_key("name"));
        assert_eq!(old_values["is_active"], json!(true));
        assert_eq!(new_values["is_active"], json!(false));
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let fields = field_map! { "code" => "USERS_VIEW", "is_active" => true };
        let (old_values, new_values) = diff_fields(&fields, &fields);
        assert!(old_values.is_empty());
        assert!(new_values.is_empty());
    }

    #[test]
    fn option_fields_serialize_as_null() {
        let tenant: Option<String> = None;
        let fields = field_map! { "tenant_id" => tenant };
        assert_eq!(fields["tenant_id"], JsonValue::Null);
    }

    fn snapshot() -> impl Strategy<Value = FieldMap> {
        (
            "[a-z]{0,8}",
            any::<bool>(),
            proptest::option::of("[a-z ]{0,12}"),
            0i64..100,
        )
            .prop_map(|(name, active, description, rank)| {
                field_map! {
                    "name" => name,
                    "is_active" => active,
                    "description" => description,
                    "rank" => rank,
                }
            })
    }

    proptest! {
        /// Replaying old values onto the post-update snapshot restores the
        /// pre-update snapshot, and replaying new values restores the
        /// post-update snapshot, touching only the diffed fields.
        #[test]
        fn replay_round_trips(before in snapshot(), after in snapshot()) {
            let (old_values, new_values) = diff_fields(&before, &after);

            let mut restored = after.clone();
            replay(&mut restored, &old_values);
            prop_assert_eq!(&restored, &before);

            replay(&mut restored, &new_values);
            prop_assert_eq!(&restored, &after);

            for name in old_values.keys() {
                prop_assert_ne!(&before[name], &after[name]);
            }
        }
    }
}
