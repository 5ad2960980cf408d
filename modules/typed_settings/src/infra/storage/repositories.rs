//! SeaORM repository implementation

use super::entity;
use super::mapper::{new_row, updated_row};
use super::migrations::Migrator;
use crate::contract::{RawPropertyMap, RawValue, SettingsError, SettingsResult};
use crate::domain::repository::SettingsRepository;
use anyhow::Context;
use async_trait::async_trait;
use sea_orm::{
    prelude::Expr, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, SqlErr, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Settings rows in a SQL database (Postgres or SQLite)
pub struct SeaOrmSettingsRepository {
    db: Arc<DatabaseConnection>,
}

fn unavailable(group: &str) -> impl FnOnce(DbErr) -> SettingsError + '_ {
    move |e| SettingsError::unavailable(group, e)
}

impl SeaOrmSettingsRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connect and bring the `settings` table up to date
    pub async fn connect(url: &str, max_connections: Option<u32>) -> anyhow::Result<Self> {
        // Each connection to an in-memory SQLite database is a separate database
        let in_memory = url.starts_with("sqlite") && url.contains(":memory:");
        let default_connections = if in_memory { 1 } else { 10 };

        let mut options = ConnectOptions::new(url.to_owned());
        options
            .max_connections(max_connections.unwrap_or(default_connections))
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .context("failed to connect to settings database")?;
        Migrator::up(&db, None)
            .await
            .context("failed to run settings table migrations")?;

        tracing::info!(backend = ?db.get_database_backend(), "settings database ready");
        Ok(Self::new(Arc::new(db)))
    }

    async fn find_row<C: ConnectionTrait>(
        conn: &C,
        group: &str,
        name: &str,
    ) -> Result<Option<entity::Model>, DbErr> {
        entity::Entity::find_by_id((group.to_string(), name.to_string()))
            .one(conn)
            .await
    }

    async fn set_locked(&self, group: &str, names: &[String], locked: bool) -> SettingsResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        entity::Entity::update_many()
            .col_expr(entity::Column::Locked, Expr::value(locked))
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Name.is_in(names.iter().cloned()))
            .exec(&*self.db)
            .await
            .map_err(unavailable(group))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for SeaOrmSettingsRepository {
    async fn fetch(&self, group: &str) -> SettingsResult<RawPropertyMap> {
        let rows = entity::Entity::find()
            .filter(entity::Column::GroupName.eq(group))
            .order_by_asc(entity::Column::Name)
            .all(&*self.db)
            .await
            .map_err(unavailable(group))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.name.clone(), RawValue::from(row)))
            .collect())
    }

    async fn fetch_properties(&self, group: &str, names: &[String]) -> SettingsResult<RawPropertyMap> {
        if names.is_empty() {
            return Ok(RawPropertyMap::new());
        }
        let rows = entity::Entity::find()
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Name.is_in(names.iter().cloned()))
            .all(&*self.db)
            .await
            .map_err(unavailable(group))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.name.clone(), RawValue::from(row)))
            .collect())
    }

    async fn save(&self, group: &str, values: &RawPropertyMap) -> SettingsResult<()> {
        let txn = self.db.begin().await.map_err(unavailable(group))?;

        for (name, value) in values {
            let existing = Self::find_row(&txn, group, name)
                .await
                .map_err(unavailable(group))?;
            match existing {
                Some(row) => {
                    entity::Entity::update(updated_row(row, value.clone()))
                        .exec(&txn)
                        .await
                        .map_err(unavailable(group))?;
                }
                None => {
                    entity::Entity::insert(new_row(group, name, value.clone()))
                        .exec_without_returning(&txn)
                        .await
                        .map_err(unavailable(group))?;
                }
            }
        }

        txn.commit().await.map_err(unavailable(group))
    }

    async fn get_property(&self, group: &str, name: &str) -> SettingsResult<Option<RawValue>> {
        let row = Self::find_row(&*self.db, group, name)
            .await
            .map_err(unavailable(group))?;
        Ok(row.map(RawValue::from))
    }

    async fn create_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        let inserted = entity::Entity::insert(new_row(group, name, value))
            .exec_without_returning(&*self.db)
            .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(SettingsError::PropertyAlreadyExists {
                    group: group.to_string(),
                    property: name.to_string(),
                })
            }
            Err(e) => Err(SettingsError::unavailable(group, e)),
        }
    }

    async fn update_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        let result = entity::Entity::update_many()
            .col_expr(entity::Column::Payload, Expr::value(value.payload))
            .col_expr(entity::Column::Encrypted, Expr::value(value.encrypted))
            .col_expr(entity::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Name.eq(name))
            .exec(&*self.db)
            .await
            .map_err(unavailable(group))?;

        if result.rows_affected == 0 {
            return Err(SettingsError::PropertyNotFound {
                group: group.to_string(),
                property: name.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_property(&self, group: &str, name: &str) -> SettingsResult<bool> {
        let result = entity::Entity::delete_many()
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Name.eq(name))
            .exec(&*self.db)
            .await
            .map_err(unavailable(group))?;

        Ok(result.rows_affected > 0)
    }

    async fn rename_property(&self, group: &str, from: &str, to: &str) -> SettingsResult<bool> {
        let txn = self.db.begin().await.map_err(unavailable(group))?;

        if Self::find_row(&txn, group, from)
            .await
            .map_err(unavailable(group))?
            .is_none()
        {
            return Ok(false);
        }
        if Self::find_row(&txn, group, to)
            .await
            .map_err(unavailable(group))?
            .is_some()
        {
            return Err(SettingsError::RenameConflict {
                group: group.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        entity::Entity::update_many()
            .col_expr(entity::Column::Name, Expr::value(to))
            .col_expr(entity::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Name.eq(from))
            .exec(&txn)
            .await
            .map_err(unavailable(group))?;

        txn.commit().await.map_err(unavailable(group))?;
        Ok(true)
    }

    async fn lock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.set_locked(group, names, true).await
    }

    async fn unlock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.set_locked(group, names, false).await
    }

    async fn locked_properties(&self, group: &str) -> SettingsResult<BTreeSet<String>> {
        let rows = entity::Entity::find()
            .filter(entity::Column::GroupName.eq(group))
            .filter(entity::Column::Locked.eq(true))
            .all(&*self.db)
            .await
            .map_err(unavailable(group))?;

        Ok(rows.into_iter().map(|row| row.name).collect())
    }
}
