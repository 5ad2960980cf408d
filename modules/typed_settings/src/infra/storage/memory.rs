//! In-process repository, used for tests and as the fallback default

use crate::contract::{RawPropertyMap, RawValue, SettingsError, SettingsResult};
use crate::domain::repository::SettingsRepository;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct Row {
    value: RawValue,
    locked: bool,
}

/// Group → property → row, guarded by a single lock
#[derive(Debug, Default)]
pub struct InMemorySettingsRepository {
    groups: RwLock<HashMap<String, BTreeMap<String, Row>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_locked(&self, group: &str, names: &[String], locked: bool) {
        let mut groups = self.groups.write();
        if let Some(rows) = groups.get_mut(group) {
            for name in names {
                if let Some(row) = rows.get_mut(name) {
                    row.locked = locked;
                }
            }
        }
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn fetch(&self, group: &str) -> SettingsResult<RawPropertyMap> {
        Ok(self
            .groups
            .read()
            .get(group)
            .map(|rows| {
                rows.iter()
                    .map(|(name, row)| (name.clone(), row.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save(&self, group: &str, values: &RawPropertyMap) -> SettingsResult<()> {
        let mut groups = self.groups.write();
        let rows = groups.entry(group.to_string()).or_default();
        for (name, value) in values {
            rows.entry(name.clone())
                .and_modify(|row| row.value = value.clone())
                .or_insert_with(|| Row {
                    value: value.clone(),
                    locked: false,
                });
        }
        Ok(())
    }

    async fn get_property(&self, group: &str, name: &str) -> SettingsResult<Option<RawValue>> {
        Ok(self
            .groups
            .read()
            .get(group)
            .and_then(|rows| rows.get(name))
            .map(|row| row.value.clone()))
    }

    async fn create_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        let mut groups = self.groups.write();
        let rows = groups.entry(group.to_string()).or_default();
        if rows.contains_key(name) {
            return Err(SettingsError::PropertyAlreadyExists {
                group: group.to_string(),
                property: name.to_string(),
            });
        }
        rows.insert(name.to_string(), Row { value, locked: false });
        Ok(())
    }

    async fn update_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        let mut groups = self.groups.write();
        match groups.get_mut(group).and_then(|rows| rows.get_mut(name)) {
            Some(row) => {
                row.value = value;
                Ok(())
            }
            None => Err(SettingsError::PropertyNotFound {
                group: group.to_string(),
                property: name.to_string(),
            }),
        }
    }

    async fn delete_property(&self, group: &str, name: &str) -> SettingsResult<bool> {
        let mut groups = self.groups.write();
        Ok(groups
            .get_mut(group)
            .is_some_and(|rows| rows.remove(name).is_some()))
    }

    async fn rename_property(&self, group: &str, from: &str, to: &str) -> SettingsResult<bool> {
        let mut groups = self.groups.write();
        let Some(rows) = groups.get_mut(group) else {
            return Ok(false);
        };
        if !rows.contains_key(from) {
            return Ok(false);
        }
        if rows.contains_key(to) {
            return Err(SettingsError::RenameConflict {
                group: group.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if let Some(row) = rows.remove(from) {
            rows.insert(to.to_string(), row);
        }
        Ok(true)
    }

    async fn lock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.set_locked(group, names, true);
        Ok(())
    }

    async fn unlock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.set_locked(group, names, false);
        Ok(())
    }

    async fn locked_properties(&self, group: &str) -> SettingsResult<BTreeSet<String>> {
        Ok(self
            .groups
            .read()
            .get(group)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.locked)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
