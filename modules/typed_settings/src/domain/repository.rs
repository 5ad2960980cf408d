//! Repository trait for persisted settings
//!
//! A repository stores raw name → value pairs per group. Implementations are
//! in infra/storage.

use crate::contract::{RawPropertyMap, RawValue, SettingsResult};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Storage backend for settings groups
///
/// Absent properties are omitted from fetch results, never reported as
/// errors. Transport failures surface as `SettingsError::RepositoryUnavailable`.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// All persisted properties of a group
    async fn fetch(&self, group: &str) -> SettingsResult<RawPropertyMap>;

    /// Only the named properties of a group
    async fn fetch_properties(&self, group: &str, names: &[String]) -> SettingsResult<RawPropertyMap> {
        let mut all = self.fetch(group).await?;
        all.retain(|name, _| names.contains(name));
        Ok(all)
    }

    /// Upsert every given property
    async fn save(&self, group: &str, values: &RawPropertyMap) -> SettingsResult<()>;

    /// Single property, `None` if absent
    async fn get_property(&self, group: &str, name: &str) -> SettingsResult<Option<RawValue>>;

    async fn property_exists(&self, group: &str, name: &str) -> SettingsResult<bool> {
        Ok(self.get_property(group, name).await?.is_some())
    }

    /// Insert a new property; `PropertyAlreadyExists` if present
    async fn create_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()>;

    /// Replace the value of an existing property; `PropertyNotFound` if absent
    async fn update_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()>;

    /// Remove a property; returns whether it existed
    async fn delete_property(&self, group: &str, name: &str) -> SettingsResult<bool>;

    /// Atomically move `from` to `to`, keeping payload, encryption and lock
    ///
    /// Returns `false` when `from` is absent. Fails with `RenameConflict`
    /// without any effect when `to` already exists.
    async fn rename_property(&self, group: &str, from: &str, to: &str) -> SettingsResult<bool>;

    async fn lock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()>;

    async fn unlock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()>;

    async fn locked_properties(&self, group: &str) -> SettingsResult<BTreeSet<String>>;
}
