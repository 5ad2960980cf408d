//! Settings store - ties repositories, casts, metadata and the mapper together

use super::cast::{CastRegistry, CompositeType};
use super::crypto::Crypto;
use super::events::{NoOpEventListener, SettingsEventListener};
use super::instance::SettingsInstance;
use super::mapper::{LoadedProperties, SettingsMapper};
use super::registry::{ConfigRegistry, RepositoryResolver, SettingsConfig};
use super::repository::SettingsRepository;
use super::settings::Settings;
use crate::config::{Config, RepositoryConfig, ResolutionPolicy, ScalarDefaults};
use crate::contract::{PropertyMap, SeedColumn, SettingsError, SettingsResult};
use crate::infra::storage::memory::InMemorySettingsRepository;
use crate::infra::storage::repositories::SeaOrmSettingsRepository;
use crate::migrations::SettingsMigrator;
use anyhow::Context;
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// Group name and seed columns of a registered settings type
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSchema {
    pub group: String,
    pub repository: String,
    pub columns: Vec<SeedColumn>,
}

type SchemaFn = fn(&SettingsStore) -> SettingsResult<SettingsSchema>;

fn schema_of<S: Settings>(store: &SettingsStore) -> SettingsResult<SettingsSchema> {
    let config = store.config::<S>()?;
    Ok(SettingsSchema {
        group: config.group().to_string(),
        repository: config.repository_name().to_string(),
        columns: store.mapper().columns(&config)?,
    })
}

struct StoreInner {
    repositories: RepositoryResolver,
    casts: Arc<CastRegistry>,
    configs: ConfigRegistry,
    mapper: SettingsMapper,
    listener: Arc<dyn SettingsEventListener>,
    /// Settings types addressable by name, for "Create…" migrations
    catalog: DashMap<String, SchemaFn>,
    /// Values installed by `fake`, served instead of loading
    fakes: DashMap<TypeId, PropertyMap>,
    resolution: ResolutionPolicy,
}

/// Entry point for settings objects and migrators
///
/// Cheap to clone; clones share metadata caches and repositories.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("default_repository", &self.inner.repositories.default_name())
            .field("configs", &self.inner.configs.len())
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    pub fn builder() -> SettingsStoreBuilder {
        SettingsStoreBuilder::default()
    }

    /// Build from configuration, connecting and migrating database repositories
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut builder = Self::builder()
            .default_repository(config.default_repository.clone())
            .crypto(config.crypto()?)
            .defaults(config.defaults.clone())
            .resolution(config.migration_resolution);

        for (name, repository) in &config.repositories {
            let repository: Arc<dyn SettingsRepository> = match repository {
                RepositoryConfig::Database {
                    url,
                    max_connections,
                } => Arc::new(
                    SeaOrmSettingsRepository::connect(url, *max_connections)
                        .await
                        .with_context(|| format!("settings repository '{name}'"))?,
                ),
                RepositoryConfig::Memory => Arc::new(InMemorySettingsRepository::new()),
            };
            builder = builder.repository(name.clone(), repository);
        }

        let store = builder.build();
        tracing::info!(
            default_repository = %config.default_repository,
            repositories = config.repositories.len(),
            "settings store initialized"
        );
        Ok(store)
    }

    // ===== Metadata =====

    /// Cached metadata of `S`, validated on first use
    pub fn config<S: Settings>(&self) -> SettingsResult<Arc<SettingsConfig>> {
        self.inner
            .configs
            .get_or_build::<S>(&self.inner.casts, &self.inner.repositories)
    }

    /// Drop cached metadata and fake values of `S`
    pub fn invalidate<S: Settings>(&self) {
        self.inner.configs.invalidate::<S>();
        self.inner.fakes.remove(&TypeId::of::<S>());
    }

    pub fn invalidate_all(&self) {
        self.inner.configs.clear();
        self.inner.fakes.clear();
    }

    pub fn casts(&self) -> &CastRegistry {
        &self.inner.casts
    }

    pub(crate) fn mapper(&self) -> &SettingsMapper {
        &self.inner.mapper
    }

    pub(crate) fn listener(&self) -> &dyn SettingsEventListener {
        self.inner.listener.as_ref()
    }

    // ===== Settings objects =====

    /// Unloaded instance; the first access fetches from the repository
    ///
    /// If `S` was faked, the instance is populated from the fake instead.
    pub async fn settings<S: Settings>(&self) -> SettingsResult<SettingsInstance<S>> {
        let config = self.config::<S>()?;
        let faked = self
            .inner
            .fakes
            .get(&TypeId::of::<S>())
            .map(|values| values.value().clone());

        match faked {
            Some(values) => {
                let loaded = LoadedProperties {
                    values,
                    ..LoadedProperties::default()
                };
                Ok(SettingsInstance::from_loaded(self.clone(), config, loaded).await)
            }
            None => Ok(SettingsInstance::new(self.clone(), config)),
        }
    }

    /// Instance with values already fetched
    pub async fn load<S: Settings>(&self) -> SettingsResult<SettingsInstance<S>> {
        let mut instance = self.settings::<S>().await?;
        instance.ensure_loaded().await?;
        Ok(instance)
    }

    /// Stub `S` with `overrides` on top of stored values
    ///
    /// Only the properties missing from `overrides` are fetched. Later calls
    /// to [`Self::settings`] return the same values without loading, until
    /// [`Self::invalidate`] or [`Self::clear_fakes`].
    pub async fn fake<S: Settings>(
        &self,
        overrides: PropertyMap,
    ) -> SettingsResult<SettingsInstance<S>> {
        let config = self.config::<S>()?;
        for (name, value) in &overrides {
            let property = config.require_property(name)?;
            property
                .cast
                .to_raw(value.clone())
                .map_err(|e| SettingsError::cast_failure(config.group(), name, e))?;
        }

        let missing: Vec<String> = config
            .property_names()
            .into_iter()
            .filter(|name| !overrides.contains_key(name))
            .collect();

        let mut loaded = self.inner.mapper.fetch_properties(&config, &missing).await?;
        for (name, value) in overrides {
            loaded.faults.remove(&name);
            loaded.values.insert(name, value);
        }

        self.inner
            .fakes
            .insert(TypeId::of::<S>(), loaded.values.clone());
        tracing::debug!(group = config.group(), "settings faked");

        Ok(SettingsInstance::from_loaded(self.clone(), config, loaded).await)
    }

    pub fn clear_fakes(&self) {
        self.inner.fakes.clear();
    }

    /// Rebuild an instance from [`SettingsInstance::seal`] output
    pub async fn unseal<S: Settings>(
        &self,
        sealed: PropertyMap,
    ) -> SettingsResult<SettingsInstance<S>> {
        let config = self.config::<S>()?;
        for name in sealed.keys() {
            config.require_property(name)?;
        }
        let values = self.inner.mapper.unseal(&config, sealed)?;
        let loaded = LoadedProperties {
            values,
            ..LoadedProperties::default()
        };
        Ok(SettingsInstance::from_loaded(self.clone(), config, loaded).await)
    }

    // ===== Migrations =====

    /// Make `S` resolvable by "Create…" migrations
    pub fn register<S: Settings>(&self) -> SettingsResult<()> {
        self.config::<S>()?;
        self.inner
            .catalog
            .insert(S::name().to_string(), schema_of::<S> as SchemaFn);
        Ok(())
    }

    /// Schema of the settings type registered as `name`
    pub fn schema(&self, name: &str) -> SettingsResult<Option<SettingsSchema>> {
        let schema_fn = self.inner.catalog.get(name).map(|entry| *entry.value());
        schema_fn.map(|f| f(self)).transpose()
    }

    pub fn resolution_policy(&self) -> ResolutionPolicy {
        self.inner.resolution
    }

    /// Migrator bound to the default repository
    pub fn migrator(&self) -> SettingsResult<SettingsMigrator> {
        self.migrator_for(self.inner.repositories.default_name())
    }

    pub fn migrator_for(&self, repository: &str) -> SettingsResult<SettingsMigrator> {
        let (_, repo) = self
            .inner
            .repositories
            .resolve(Some(repository))
            .ok_or_else(|| {
                SettingsError::config(
                    repository,
                    format!("unknown settings repository '{repository}'"),
                )
            })?;
        Ok(
            SettingsMigrator::new(repo, Arc::clone(self.inner.mapper.crypto()))
                .with_casts(Arc::clone(&self.inner.casts)),
        )
    }
}

pub struct SettingsStoreBuilder {
    repositories: RepositoryResolver,
    casts: CastRegistry,
    crypto: Option<Crypto>,
    defaults: ScalarDefaults,
    listener: Option<Arc<dyn SettingsEventListener>>,
    resolution: ResolutionPolicy,
}

impl Default for SettingsStoreBuilder {
    fn default() -> Self {
        Self {
            repositories: RepositoryResolver::new("default"),
            casts: CastRegistry::new(),
            crypto: None,
            defaults: ScalarDefaults::default(),
            listener: None,
            resolution: ResolutionPolicy::default(),
        }
    }
}

impl SettingsStoreBuilder {
    pub fn repository(
        mut self,
        name: impl Into<String>,
        repository: Arc<dyn SettingsRepository>,
    ) -> Self {
        self.repositories.insert(name, repository);
        self
    }

    pub fn default_repository(mut self, name: impl Into<String>) -> Self {
        self.repositories.set_default(name);
        self
    }

    pub fn composite(mut self, composite: CompositeType) -> Self {
        self.casts.register(composite);
        self
    }

    pub fn crypto(mut self, crypto: Crypto) -> Self {
        self.crypto = Some(crypto);
        self
    }

    pub fn defaults(mut self, defaults: ScalarDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn SettingsEventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn resolution(mut self, resolution: ResolutionPolicy) -> Self {
        self.resolution = resolution;
        self
    }

    /// Without any repository, an in-memory one is used as the default
    pub fn build(mut self) -> SettingsStore {
        if self.repositories.names().next().is_none() {
            let default = self.repositories.default_name().to_string();
            self.repositories
                .insert(default, Arc::new(InMemorySettingsRepository::new()));
        }

        let crypto = Arc::new(self.crypto.unwrap_or_else(|| {
            tracing::warn!("settings store built without a key, using an ephemeral one");
            Crypto::generate()
        }));
        let casts = Arc::new(self.casts);

        SettingsStore {
            inner: Arc::new(StoreInner {
                mapper: SettingsMapper::new(crypto, Arc::clone(&casts), self.defaults),
                repositories: self.repositories,
                casts,
                configs: ConfigRegistry::new(),
                listener: self.listener.unwrap_or_else(|| {
                    Arc::new(NoOpEventListener) as Arc<dyn SettingsEventListener>
                }),
                catalog: DashMap::new(),
                fakes: DashMap::new(),
                resolution: self.resolution,
            }),
        }
    }
}
