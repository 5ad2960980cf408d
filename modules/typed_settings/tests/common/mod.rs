//! Common test utilities and shared settings fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use typed_settings::contract::{
    PropertyDescriptor, PropertyMap, PropertyType, RawPropertyMap, RawValue, SettingsResult,
};
use typed_settings::domain::{
    CompositeType, Crypto, Settings, SettingsEvent, SettingsEventListener, SettingsRepository,
    SettingsStore,
};
use typed_settings::InMemorySettingsRepository;

pub const TEST_KEY: [u8; 32] = [7u8; 32];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    println!("\n🧪 TEST: {}", test_name);
    if let Some(first) = purpose.first() {
        println!("📋 PURPOSE: {}", first);
    }
    for line in purpose.iter().skip(1) {
        println!("   {}", line);
    }
}

pub fn test_crypto() -> Crypto {
    Crypto::from_key_bytes(&TEST_KEY).unwrap()
}

pub fn sender_composite() -> CompositeType {
    CompositeType::new("Sender")
        .field("name", PropertyType::String)
        .field("address", PropertyType::String)
        .default_from::<Sender>()
        .unwrap()
}

/// Store over `repository` with a fixed key and the fixture composites
pub fn store_with(repository: Arc<dyn SettingsRepository>) -> SettingsStore {
    init_tracing();
    SettingsStore::builder()
        .repository("default", repository)
        .crypto(test_crypto())
        .composite(sender_composite())
        .build()
}

// ===== Fixture settings types =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub site_name: String,
    pub site_active: bool,
    pub theme: Theme,
    pub max_upload_mb: i64,
    pub api_token: Option<String>,
    pub tags: Vec<String>,
}

impl Settings for GeneralSettings {
    fn group() -> &'static str {
        "general"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![
            PropertyDescriptor::new("site_name", PropertyType::String).default_value("Acme"),
            PropertyDescriptor::new("site_active", PropertyType::Bool),
            PropertyDescriptor::new("theme", PropertyType::Enum(&["light", "dark"])),
            PropertyDescriptor::new("max_upload_mb", PropertyType::Int).default_value(10),
            PropertyDescriptor::new("api_token", PropertyType::String.nullable()),
            PropertyDescriptor::new("tags", PropertyType::list(PropertyType::String)),
        ]
    }

    fn encrypted() -> &'static [&'static str] {
        &["api_token"]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailSettings {
    pub host: String,
    pub port: i64,
    pub password: String,
    pub sender: Sender,
}

impl Settings for MailSettings {
    fn group() -> &'static str {
        "mail"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![
            PropertyDescriptor::new("host", PropertyType::String),
            PropertyDescriptor::new("port", PropertyType::Int),
            PropertyDescriptor::new("password", PropertyType::String),
            PropertyDescriptor::new("sender", PropertyType::Composite("Sender")),
        ]
    }

    fn encrypted() -> &'static [&'static str] {
        &["password"]
    }

    fn defaults() -> PropertyMap {
        PropertyMap::from([
            ("host".to_string(), json!("localhost")),
            ("port".to_string(), json!(25)),
        ])
    }
}

/// A property with no derivable default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    pub flags: serde_json::Value,
}

impl Settings for FeatureSettings {
    fn group() -> &'static str {
        "features"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("flags", PropertyType::Json)]
    }
}

// ===== Repository and listener doubles =====

/// In-memory repository that counts full group fetches
#[derive(Default)]
pub struct CountingRepository {
    inner: InMemorySettingsRepository,
    fetches: AtomicUsize,
}

impl CountingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsRepository for CountingRepository {
    async fn fetch(&self, group: &str) -> SettingsResult<RawPropertyMap> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(group).await
    }

    async fn fetch_properties(&self, group: &str, names: &[String]) -> SettingsResult<RawPropertyMap> {
        self.inner.fetch_properties(group, names).await
    }

    async fn save(&self, group: &str, values: &RawPropertyMap) -> SettingsResult<()> {
        self.inner.save(group, values).await
    }

    async fn get_property(&self, group: &str, name: &str) -> SettingsResult<Option<RawValue>> {
        self.inner.get_property(group, name).await
    }

    async fn create_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        self.inner.create_property(group, name, value).await
    }

    async fn update_property(&self, group: &str, name: &str, value: RawValue) -> SettingsResult<()> {
        self.inner.update_property(group, name, value).await
    }

    async fn delete_property(&self, group: &str, name: &str) -> SettingsResult<bool> {
        self.inner.delete_property(group, name).await
    }

    async fn rename_property(&self, group: &str, from: &str, to: &str) -> SettingsResult<bool> {
        self.inner.rename_property(group, from, to).await
    }

    async fn lock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.inner.lock_properties(group, names).await
    }

    async fn unlock_properties(&self, group: &str, names: &[String]) -> SettingsResult<()> {
        self.inner.unlock_properties(group, names).await
    }

    async fn locked_properties(&self, group: &str) -> SettingsResult<BTreeSet<String>> {
        self.inner.locked_properties(group).await
    }
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SettingsEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<SettingsEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl SettingsEventListener for RecordingListener {
    async fn handle(&self, event: SettingsEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
