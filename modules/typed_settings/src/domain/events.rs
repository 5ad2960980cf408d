//! Lifecycle events for settings objects
//!
//! Events are one-shot notifications emitted by a settings instance:
//! - `SettingsLoaded`: after the first repository fetch (or a refresh)
//! - `SavingSettings`: before the mapper persists, with the previous snapshot
//! - `SettingsSaved`: after the repository accepted the write

use crate::contract::PropertyMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SettingsEvent {
    SettingsLoaded(SettingsLoadedEvent),
    SavingSettings(SavingSettingsEvent),
    SettingsSaved(SettingsSavedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsLoadedEvent {
    pub group: String,
    pub values: PropertyMap,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingSettingsEvent {
    pub group: String,
    /// Values about to be saved
    pub values: PropertyMap,
    /// Snapshot from the last load or save, if any
    pub original: Option<PropertyMap>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSavedEvent {
    pub group: String,
    /// Canonical state after the save
    pub values: PropertyMap,
    pub timestamp: DateTime<Utc>,
}

impl SettingsEvent {
    pub fn loaded(group: &str, values: &PropertyMap) -> Self {
        SettingsEvent::SettingsLoaded(SettingsLoadedEvent {
            group: group.to_string(),
            values: values.clone(),
            timestamp: Utc::now(),
        })
    }

    pub fn saving(group: &str, values: &PropertyMap, original: Option<&PropertyMap>) -> Self {
        SettingsEvent::SavingSettings(SavingSettingsEvent {
            group: group.to_string(),
            values: values.clone(),
            original: original.cloned(),
            timestamp: Utc::now(),
        })
    }

    pub fn saved(group: &str, values: &PropertyMap) -> Self {
        SettingsEvent::SettingsSaved(SettingsSavedEvent {
            group: group.to_string(),
            values: values.clone(),
            timestamp: Utc::now(),
        })
    }

    pub fn group(&self) -> &str {
        match self {
            SettingsEvent::SettingsLoaded(e) => &e.group,
            SettingsEvent::SavingSettings(e) => &e.group,
            SettingsEvent::SettingsSaved(e) => &e.group,
        }
    }
}

/// Observer of settings lifecycle events
///
/// Failures are logged by the caller and never abort a load or save.
#[async_trait::async_trait]
pub trait SettingsEventListener: Send + Sync {
    async fn handle(&self, event: SettingsEvent) -> anyhow::Result<()>;
}

/// Listener used when nobody observes settings events
pub struct NoOpEventListener;

#[async_trait::async_trait]
impl SettingsEventListener for NoOpEventListener {
    async fn handle(&self, _event: SettingsEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Deliver `event`, logging instead of failing
pub(crate) async fn dispatch(listener: &dyn SettingsEventListener, event: SettingsEvent) {
    let group = event.group().to_string();
    if let Err(e) = listener.handle(event).await {
        tracing::warn!(group = %group, error = %e, "settings event listener failed");
    }
}
