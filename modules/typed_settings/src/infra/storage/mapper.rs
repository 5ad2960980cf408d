//! Entity to model mappers
//!
//! Conversions between SeaORM rows and raw property values

use super::entity;
use crate::contract::RawValue;
use chrono::Utc;

impl From<entity::Model> for RawValue {
    fn from(row: entity::Model) -> Self {
        Self {
            payload: row.payload,
            encrypted: row.encrypted,
        }
    }
}

/// New unlocked row for `group`.`name`
pub(super) fn new_row(group: &str, name: &str, value: RawValue) -> entity::ActiveModel {
    use sea_orm::ActiveValue::Set;

    let now = Utc::now();
    entity::ActiveModel {
        group_name: Set(group.to_string()),
        name: Set(name.to_string()),
        payload: Set(value.payload),
        encrypted: Set(value.encrypted),
        locked: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

/// Existing row with a new value; lock state and creation time untouched
pub(super) fn updated_row(row: entity::Model, value: RawValue) -> entity::ActiveModel {
    use sea_orm::ActiveValue::Set;
    use sea_orm::IntoActiveModel;

    let mut active = row.into_active_model();
    active.payload = Set(value.payload);
    active.encrypted = Set(value.encrypted);
    active.updated_at = Set(Utc::now());
    active
}
