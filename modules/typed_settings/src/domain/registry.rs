//! Per-type settings metadata and the process-wide registry caching it

use super::cast::{CastRegistry, SettingsCast};
use super::repository::SettingsRepository;
use super::settings::Settings;
use crate::contract::{PropertyDescriptor, SettingsError, SettingsResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Named repositories plus the one used when a type names none
#[derive(Clone, Default)]
pub struct RepositoryResolver {
    default: String,
    repositories: HashMap<String, Arc<dyn SettingsRepository>>,
}

impl RepositoryResolver {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            repositories: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, repository: Arc<dyn SettingsRepository>) {
        self.repositories.insert(name.into(), repository);
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default = name.into();
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn resolve(&self, name: Option<&str>) -> Option<(&str, Arc<dyn SettingsRepository>)> {
        let name = name.unwrap_or(&self.default);
        self.repositories
            .get_key_value(name)
            .map(|(name, repo)| (name.as_str(), Arc::clone(repo)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }
}

/// Declared property with its resolved cast
#[derive(Debug, Clone)]
pub struct ResolvedProperty {
    pub descriptor: PropertyDescriptor,
    pub cast: Arc<dyn SettingsCast>,
}

/// Metadata of one settings type, built once and shared
pub struct SettingsConfig {
    type_name: &'static str,
    group: String,
    properties: Vec<ResolvedProperty>,
    repository_name: String,
    repository: Arc<dyn SettingsRepository>,
    /// Locked property names; `None` until first read or after a refresh
    locked: RwLock<Option<BTreeSet<String>>>,
}

impl std::fmt::Debug for SettingsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsConfig")
            .field("type_name", &self.type_name)
            .field("group", &self.group)
            .field("properties", &self.properties)
            .field("repository", &self.repository_name)
            .finish_non_exhaustive()
    }
}

impl SettingsConfig {
    /// Validate the static metadata of `S` and resolve casts and repository
    pub fn build<S: Settings>(
        casts: &CastRegistry,
        repositories: &RepositoryResolver,
    ) -> SettingsResult<Self> {
        let group = S::group();
        if group.trim().is_empty() {
            return Err(SettingsError::config(group, format!("{} has an empty group", S::name())));
        }

        let mut descriptors = S::properties();
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(SettingsError::config(
                    group,
                    format!("property '{}' is declared twice", descriptor.name),
                ));
            }
        }
        let declared: HashSet<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        for name in S::encrypted() {
            if !declared.contains(*name) {
                return Err(SettingsError::InvalidEncryptedProperty {
                    group: group.to_string(),
                    property: (*name).to_string(),
                });
            }
        }

        let mut overrides: HashMap<&str, Arc<dyn SettingsCast>> = HashMap::new();
        for (name, cast) in S::casts() {
            if !declared.contains(name) {
                return Err(SettingsError::config(
                    group,
                    format!("cast given for undeclared property '{name}'"),
                ));
            }
            overrides.insert(name, cast);
        }

        let mut defaults = S::defaults();
        if let Some(name) = defaults.keys().find(|name| !declared.contains(*name)) {
            return Err(SettingsError::config(
                group,
                format!("default given for undeclared property '{name}'"),
            ));
        }

        let mut properties = Vec::with_capacity(descriptors.len());
        for mut descriptor in descriptors.drain(..) {
            descriptor.encrypted = S::encrypted().contains(&descriptor.name.as_str());

            let cast = match overrides.remove(descriptor.name.as_str()) {
                Some(cast) => cast,
                None => casts.resolve(&descriptor.ty).map_err(|missing| {
                    SettingsError::CastMissing {
                        group: group.to_string(),
                        property: descriptor.name.clone(),
                        type_name: missing.0,
                    }
                })?,
            };

            // A declared default on the property wins over defaults()
            if let Some(fallback) = defaults.remove(&descriptor.name) {
                if descriptor.default.is_none() {
                    descriptor.default = Some(fallback);
                }
            }
            if let Some(default) = &descriptor.default {
                cast.to_raw(default.clone()).map_err(|e| {
                    SettingsError::config(
                        group,
                        format!("default of '{}' is malformed: {e}", descriptor.name),
                    )
                })?;
            }

            properties.push(ResolvedProperty { descriptor, cast });
        }

        let (repository_name, repository) =
            repositories.resolve(S::repository()).ok_or_else(|| {
                SettingsError::config(
                    group,
                    format!(
                        "unknown settings repository '{}'",
                        S::repository().unwrap_or(repositories.default_name())
                    ),
                )
            })?;

        tracing::debug!(
            group,
            settings = S::name(),
            repository = repository_name,
            properties = properties.len(),
            "settings config built"
        );

        Ok(Self {
            type_name: S::name(),
            group: group.to_string(),
            properties,
            repository_name: repository_name.to_string(),
            repository,
            locked: RwLock::new(None),
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn properties(&self) -> &[ResolvedProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&ResolvedProperty> {
        self.properties.iter().find(|p| p.descriptor.name == name)
    }

    /// Like [`Self::property`] but reports undeclared names
    pub fn require_property(&self, name: &str) -> SettingsResult<&ResolvedProperty> {
        self.property(name)
            .ok_or_else(|| SettingsError::unknown_property(&self.group, name))
    }

    pub fn property_names(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|p| p.descriptor.name.clone())
            .collect()
    }

    pub fn is_encrypted(&self, name: &str) -> bool {
        self.property(name).is_some_and(|p| p.descriptor.encrypted)
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn repository(&self) -> &Arc<dyn SettingsRepository> {
        &self.repository
    }

    // ===== Locks =====

    /// Persist the lock flag for `names` and drop the cached set
    pub async fn lock(&self, names: &[&str]) -> SettingsResult<()> {
        let names = self.declared_names(names)?;
        self.repository.lock_properties(&self.group, &names).await?;
        self.clear_cached_locked_properties();
        tracing::info!(group = %self.group, properties = ?names, "settings properties locked");
        Ok(())
    }

    pub async fn unlock(&self, names: &[&str]) -> SettingsResult<()> {
        let names = self.declared_names(names)?;
        self.repository.unlock_properties(&self.group, &names).await?;
        self.clear_cached_locked_properties();
        tracing::info!(group = %self.group, properties = ?names, "settings properties unlocked");
        Ok(())
    }

    /// Locked property names, fetched once and cached until refreshed
    pub async fn locked(&self) -> SettingsResult<BTreeSet<String>> {
        if let Some(locked) = self.locked.read().as_ref() {
            return Ok(locked.clone());
        }

        let locked = self.repository.locked_properties(&self.group).await?;
        *self.locked.write() = Some(locked.clone());
        Ok(locked)
    }

    pub async fn is_locked(&self, name: &str) -> SettingsResult<bool> {
        Ok(self.locked().await?.contains(name))
    }

    pub fn clear_cached_locked_properties(&self) {
        *self.locked.write() = None;
    }

    fn declared_names(&self, names: &[&str]) -> SettingsResult<Vec<String>> {
        names
            .iter()
            .map(|name| self.require_property(name).map(|p| p.descriptor.name.clone()))
            .collect()
    }
}

/// Process-wide cache of [`SettingsConfig`] keyed by settings type
#[derive(Default)]
pub struct ConfigRegistry {
    configs: DashMap<TypeId, Arc<SettingsConfig>>,
    groups: DashMap<String, TypeId>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached config of `S`, building it on first use
    pub fn get_or_build<S: Settings>(
        &self,
        casts: &CastRegistry,
        repositories: &RepositoryResolver,
    ) -> SettingsResult<Arc<SettingsConfig>> {
        let id = TypeId::of::<S>();
        if let Some(config) = self.configs.get(&id) {
            return Ok(config.value().clone());
        }

        let built = Arc::new(SettingsConfig::build::<S>(casts, repositories)?);

        let owner = *self
            .groups
            .entry(built.group().to_string())
            .or_insert(id)
            .value();
        if owner != id {
            return Err(SettingsError::config(
                built.group(),
                format!("group is already used by another settings type than {}", S::name()),
            ));
        }

        Ok(self.configs.entry(id).or_insert(built).value().clone())
    }

    /// Forget the cached config of `S`; the next access rebuilds it
    pub fn invalidate<S: Settings>(&self) {
        let id = TypeId::of::<S>();
        if let Some((_, config)) = self.configs.remove(&id) {
            self.groups.remove(config.group());
        }
    }

    pub fn clear(&self) {
        self.configs.clear();
        self.groups.clear();
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
