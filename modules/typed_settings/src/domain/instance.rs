//! A materialized settings group
//!
//! Values are loaded lazily: the first accessor call performs exactly one
//! repository fetch, later calls are served from memory until `refresh`.

use super::events::{dispatch, SettingsEvent};
use super::mapper::{LoadedProperties, PropertyFault};
use super::registry::SettingsConfig;
use super::settings::Settings;
use super::store::SettingsStore;
use crate::contract::{PropertyMap, SettingsError, SettingsResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct LoadedState {
    values: PropertyMap,
    /// Snapshot from the last load or save
    original: PropertyMap,
    faults: BTreeMap<String, PropertyFault>,
}

impl From<LoadedProperties> for LoadedState {
    fn from(loaded: LoadedProperties) -> Self {
        Self {
            original: loaded.values.clone(),
            values: loaded.values,
            faults: loaded.faults,
        }
    }
}

pub struct SettingsInstance<S: Settings> {
    store: SettingsStore,
    config: Arc<SettingsConfig>,
    state: Option<LoadedState>,
    _settings: PhantomData<fn() -> S>,
}

impl<S: Settings> std::fmt::Debug for SettingsInstance<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsInstance")
            .field("settings", &S::name())
            .field("group", &self.config.group())
            .field("loaded", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Settings> SettingsInstance<S> {
    pub(crate) fn new(store: SettingsStore, config: Arc<SettingsConfig>) -> Self {
        Self {
            store,
            config,
            state: None,
            _settings: PhantomData,
        }
    }

    /// Instance populated from already-typed values, without a fetch
    pub(crate) async fn from_loaded(
        store: SettingsStore,
        config: Arc<SettingsConfig>,
        loaded: LoadedProperties,
    ) -> Self {
        let mut instance = Self::new(store, config);
        instance.install(loaded).await;
        instance
    }

    pub fn config(&self) -> &Arc<SettingsConfig> {
        &self.config
    }

    pub fn group(&self) -> &str {
        self.config.group()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Snapshot from the last load or save, `None` before the first load
    pub fn original_values(&self) -> Option<&PropertyMap> {
        self.state.as_ref().map(|s| &s.original)
    }

    // ===== Accessors =====

    /// Typed value of one property
    pub async fn get<V: DeserializeOwned>(&mut self, name: &str) -> SettingsResult<V> {
        let value = self.value(name).await?;
        serde_json::from_value(value)
            .map_err(|e| SettingsError::cast_failure(self.config.group(), name, e))
    }

    /// Value of one property in typed JSON form
    pub async fn value(&mut self, name: &str) -> SettingsResult<Value> {
        self.config.require_property(name)?;
        let group = self.config.group().to_string();
        let state = self.loaded().await?;

        if let Some(fault) = state.faults.get(name) {
            return Err(fault.to_error(&group, name));
        }
        state
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| SettingsError::uninitialized(&group, name))
    }

    /// Assign one property in memory; nothing is persisted until `save`
    pub async fn set<V: Serialize>(&mut self, name: &str, value: V) -> SettingsResult<()> {
        let property = self.config.require_property(name)?;
        let group = self.config.group();

        let value = serde_json::to_value(value)
            .map_err(|e| SettingsError::cast_failure(group, name, e))?;
        property
            .cast
            .to_raw(value.clone())
            .map_err(|e| SettingsError::cast_failure(group, name, e))?;

        let state = self.loaded().await?;
        state.faults.remove(name);
        state.values.insert(name.to_string(), value);
        Ok(())
    }

    /// The whole group as `S`
    pub async fn settings(&mut self) -> SettingsResult<S> {
        let config = Arc::clone(&self.config);
        let state = self.loaded().await?;

        for property in config.properties() {
            let name = &property.descriptor.name;
            if let Some(fault) = state.faults.get(name) {
                return Err(fault.to_error(config.group(), name));
            }
            if !state.values.contains_key(name) {
                return Err(SettingsError::uninitialized(config.group(), name));
            }
        }

        let document = Value::Object(state.values.clone().into_iter().collect());
        serde_json::from_value(document)
            .map_err(|e| SettingsError::cast_failure(config.group(), S::name(), e))
    }

    /// Assign every property from a typed value
    pub async fn fill(&mut self, settings: &S) -> SettingsResult<()> {
        let group = self.config.group().to_string();
        let document = serde_json::to_value(settings)
            .map_err(|e| SettingsError::cast_failure(&group, S::name(), e))?;
        let Value::Object(fields) = document else {
            return Err(SettingsError::cast_failure(
                &group,
                S::name(),
                "settings must serialize to an object",
            ));
        };

        for (name, value) in fields {
            self.set(&name, value).await?;
        }
        Ok(())
    }

    /// Mutate the typed view in place
    pub async fn update(&mut self, f: impl FnOnce(&mut S) + Send) -> SettingsResult<()> {
        let mut settings = self.settings().await?;
        f(&mut settings);
        self.fill(&settings).await
    }

    /// Copy of the current values
    ///
    /// Fails if any property could not be loaded, rather than leaving it out.
    pub async fn to_map(&mut self) -> SettingsResult<PropertyMap> {
        let config = Arc::clone(&self.config);
        let state = self.loaded().await?;
        if let Some((name, fault)) = state.faults.iter().next() {
            return Err(fault.to_error(config.group(), name));
        }
        Ok(state.values.clone())
    }

    pub async fn to_json(&mut self) -> SettingsResult<String> {
        let values = self.to_map().await?;
        serde_json::to_string(&values)
            .map_err(|e| SettingsError::cast_failure(self.config.group(), S::name(), e))
    }

    /// Values with encrypted properties sealed, for caching outside the process
    pub async fn seal(&mut self) -> SettingsResult<PropertyMap> {
        let values = self.to_map().await?;
        self.store.mapper().seal(&self.config, &values)
    }

    // ===== Persistence =====

    /// Persist unlocked properties and adopt the canonical state
    ///
    /// Locked properties revert to their last loaded value.
    pub async fn save(&mut self) -> SettingsResult<()> {
        let store = self.store.clone();
        let config = Arc::clone(&self.config);
        let locked = config.locked().await?;
        let state = self.loaded().await?;

        // A locked property is not written, so its load failure does not matter
        if let Some((name, fault)) = state
            .faults
            .iter()
            .find(|(name, _)| !locked.contains(name.as_str()))
        {
            return Err(fault.to_error(config.group(), name));
        }
        let values = state.values.clone();
        let original = state.original.clone();

        dispatch(
            store.listener(),
            SettingsEvent::saving(config.group(), &values, Some(&original)),
        )
        .await;

        let saved = store.mapper().save(&config, &values, &original).await?;

        let state = self.loaded().await?;
        for (name, value) in &saved {
            state.faults.remove(name);
            state.values.insert(name.clone(), value.clone());
        }
        state.original = saved.clone();

        dispatch(store.listener(), SettingsEvent::saved(config.group(), &saved)).await;
        Ok(())
    }

    /// Drop cached values and lock state and fetch again
    pub async fn refresh(&mut self) -> SettingsResult<()> {
        self.config.clear_cached_locked_properties();
        self.state = None;
        self.loaded().await?;
        Ok(())
    }

    /// Fetch now instead of on first access
    pub(crate) async fn ensure_loaded(&mut self) -> SettingsResult<()> {
        self.loaded().await.map(|_| ())
    }

    // ===== Locks =====

    pub async fn lock(&self, names: &[&str]) -> SettingsResult<()> {
        self.config.lock(names).await
    }

    pub async fn unlock(&self, names: &[&str]) -> SettingsResult<()> {
        self.config.unlock(names).await
    }

    pub async fn is_locked(&self, name: &str) -> SettingsResult<bool> {
        self.config.is_locked(name).await
    }

    pub async fn is_unlocked(&self, name: &str) -> SettingsResult<bool> {
        Ok(!self.is_locked(name).await?)
    }

    pub async fn locked_properties(&self) -> SettingsResult<BTreeSet<String>> {
        self.config.locked().await
    }

    // ===== Loading =====

    async fn loaded(&mut self) -> SettingsResult<&mut LoadedState> {
        if self.state.is_none() {
            let loaded = self.store.mapper().load(&self.config).await?;
            self.install(loaded).await;
        }
        self.state
            .as_mut()
            .ok_or_else(|| SettingsError::config(self.config.group(), "settings failed to load"))
    }

    async fn install(&mut self, loaded: LoadedProperties) {
        let state = LoadedState::from(loaded);
        dispatch(
            self.store.listener(),
            SettingsEvent::loaded(self.config.group(), &state.values),
        )
        .await;
        self.state = Some(state);
    }
}
