//! Settings migrations and the derived "Create…" migration

use super::migrator::SettingsMigrator;
use crate::config::ResolutionPolicy;
use crate::contract::{SettingsError, SettingsResult};
use crate::domain::store::{SettingsSchema, SettingsStore};
use async_trait::async_trait;

/// A named, reversible change to persisted settings
#[async_trait]
pub trait SettingsMigration: Send + Sync {
    fn name(&self) -> &str;

    async fn up(&self, migrator: &SettingsMigrator) -> SettingsResult<()>;

    async fn down(&self, _migrator: &SettingsMigrator) -> SettingsResult<()> {
        Ok(())
    }
}

const CREATE_PREFIX: &str = "Create";

/// Seeds or removes every property of a registered settings type
///
/// The type is found by name: `CreateGeneralSettings` resolves to the type
/// registered as `GeneralSettings`. Columns go to the repository the type
/// is bound to, not to the migrator passed in.
#[derive(Debug, Clone)]
pub struct CreateSettingsMigration {
    name: String,
    store: SettingsStore,
}

impl CreateSettingsMigration {
    pub fn new(store: SettingsStore, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// Migration for a type by its registered name
    pub fn for_settings(store: SettingsStore, settings_name: &str) -> Self {
        Self::new(store, format!("{CREATE_PREFIX}{settings_name}"))
    }

    /// Schema of the target type; `None` when unresolved under the soft policy
    pub fn resolve(&self) -> SettingsResult<Option<SettingsSchema>> {
        let schema = match self.name.strip_prefix(CREATE_PREFIX) {
            Some(settings_name) if !settings_name.is_empty() => self.store.schema(settings_name)?,
            _ => None,
        };

        if schema.is_none() {
            match self.store.resolution_policy() {
                ResolutionPolicy::Strict => {
                    return Err(SettingsError::UnresolvedMigration {
                        migration: self.name.clone(),
                    });
                }
                ResolutionPolicy::Soft => {
                    tracing::warn!(
                        migration = %self.name,
                        "settings migration does not resolve to a registered type, skipping"
                    );
                }
            }
        }
        Ok(schema)
    }
}

#[async_trait]
impl SettingsMigration for CreateSettingsMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, _migrator: &SettingsMigrator) -> SettingsResult<()> {
        let Some(schema) = self.resolve()? else {
            return Ok(());
        };
        let columns = schema.columns;
        self.store
            .migrator_for(&schema.repository)?
            .in_group(&schema.group, move |blueprint| {
                for column in columns {
                    blueprint.add_if_not_exists(&column.name, column.default, column.encrypted);
                }
            })
            .await?;
        Ok(())
    }

    async fn down(&self, _migrator: &SettingsMigrator) -> SettingsResult<()> {
        let Some(schema) = self.resolve()? else {
            return Ok(());
        };
        let columns = schema.columns;
        self.store
            .migrator_for(&schema.repository)?
            .in_group(&schema.group, move |blueprint| {
                for column in &columns {
                    blueprint.delete_if_exists(&column.name);
                }
            })
            .await?;
        Ok(())
    }
}

/// Run `up` for every migration in order
pub async fn run_up(
    migrations: &[Box<dyn SettingsMigration>],
    migrator: &SettingsMigrator,
) -> SettingsResult<()> {
    for migration in migrations {
        migration.up(migrator).await?;
        tracing::info!(migration = migration.name(), "settings migration up");
    }
    Ok(())
}

/// Run `down` for every migration in reverse order
pub async fn run_down(
    migrations: &[Box<dyn SettingsMigration>],
    migrator: &SettingsMigrator,
) -> SettingsResult<()> {
    for migration in migrations.iter().rev() {
        migration.down(migrator).await?;
        tracing::info!(migration = migration.name(), "settings migration down");
    }
    Ok(())
}
