//! SeaORM entities for database tables

use sea_orm::entity::prelude::*;

/// One persisted property of a settings group
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    /// Settings group (part of composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_name: String,

    /// Property name (part of composite primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Raw value, or a JSON string holding ciphertext when `encrypted`
    pub payload: Json,

    pub encrypted: bool,

    /// Locked properties are never overwritten by a settings save
    pub locked: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
