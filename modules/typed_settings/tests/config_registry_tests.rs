//! Integration tests for settings metadata validation and store configuration

mod common;

use common::{init_tracing, store_with, test_crypto, GeneralSettings, MailSettings};
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use typed_settings::contract::{PropertyDescriptor, PropertyMap, PropertyType, SettingsError};
use typed_settings::domain::{Crypto, Settings, SettingsStore};
use typed_settings::{Config, InMemorySettingsRepository};

#[derive(Debug, Serialize, Deserialize)]
struct UndeclaredEncrypted {
    name: String,
}

impl Settings for UndeclaredEncrypted {
    fn group() -> &'static str {
        "undeclared_encrypted"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("name", PropertyType::String)]
    }

    fn encrypted() -> &'static [&'static str] {
        &["password"]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MalformedDefault {
    retries: i64,
}

impl Settings for MalformedDefault {
    fn group() -> &'static str {
        "malformed_default"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("retries", PropertyType::Int).default_value("many")]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UnknownComposite {
    point: serde_json::Value,
}

impl Settings for UnknownComposite {
    fn group() -> &'static str {
        "unknown_composite"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("point", PropertyType::Composite("Point"))]
    }
}

/// Reuses the group of `GeneralSettings`
#[derive(Debug, Serialize, Deserialize)]
struct GeneralClone {
    site_name: String,
}

impl Settings for GeneralClone {
    fn group() -> &'static str {
        "general"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("site_name", PropertyType::String)]
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AuditSettings {
    retention_days: i64,
}

impl Settings for AuditSettings {
    fn group() -> &'static str {
        "audit"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("retention_days", PropertyType::Int).default_value(30)]
    }

    fn repository() -> Option<&'static str> {
        Some("audit")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StrayDefault {
    name: String,
}

impl Settings for StrayDefault {
    fn group() -> &'static str {
        "stray_default"
    }

    fn properties() -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::new("name", PropertyType::String)]
    }

    fn defaults() -> PropertyMap {
        PropertyMap::from([("nmae".to_string(), json!("typo"))])
    }
}

fn store() -> SettingsStore {
    store_with(Arc::new(InMemorySettingsRepository::new()))
}

#[tokio::test]
async fn test_invalid_metadata_is_rejected_at_first_use() {
    let store = store();

    assert!(matches!(
        store.config::<UndeclaredEncrypted>().unwrap_err(),
        SettingsError::InvalidEncryptedProperty { ref property, .. } if property == "password"
    ));
    assert!(matches!(
        store.config::<MalformedDefault>().unwrap_err(),
        SettingsError::Config { .. }
    ));
    assert!(matches!(
        store.config::<UnknownComposite>().unwrap_err(),
        SettingsError::CastMissing { ref type_name, .. } if type_name == "Point"
    ));
    assert!(matches!(
        store.config::<StrayDefault>().unwrap_err(),
        SettingsError::Config { .. }
    ));
    assert!(matches!(
        store.settings::<AuditSettings>().await.unwrap_err(),
        SettingsError::Config { .. }
    ));
}

#[tokio::test]
async fn test_group_belongs_to_one_type() {
    let store = store();
    store.config::<GeneralSettings>().unwrap();

    let err = store.config::<GeneralClone>().unwrap_err();
    assert!(matches!(err, SettingsError::Config { ref group, .. } if group == "general"));

    // Once the first type is forgotten the group is free again
    store.invalidate::<GeneralSettings>();
    store.config::<GeneralClone>().unwrap();
}

#[tokio::test]
async fn test_config_is_built_once_and_shared() {
    let store = store();
    let first = store.config::<GeneralSettings>().unwrap();
    let second = store.config::<GeneralSettings>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    assert!(first.is_encrypted("api_token"));
    assert!(!first.is_encrypted("site_name"));
    assert_eq!(first.repository_name(), "default");
    assert_eq!(first.property_names().len(), 6);

    store.invalidate_all();
    let rebuilt = store.config::<GeneralSettings>().unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
}

#[tokio::test]
async fn test_named_repository_binding() {
    init_tracing();
    let default_repo = Arc::new(InMemorySettingsRepository::new());
    let audit_repo = Arc::new(InMemorySettingsRepository::new());
    let store = SettingsStore::builder()
        .repository("default", default_repo.clone())
        .repository("audit", audit_repo.clone())
        .crypto(test_crypto())
        .build();

    let mut audit = store.settings::<AuditSettings>().await.unwrap();
    audit.set("retention_days", 90).await.unwrap();
    audit.save().await.unwrap();

    use typed_settings::domain::SettingsRepository;
    assert_eq!(audit_repo.fetch("audit").await.unwrap().len(), 1);
    assert!(default_repo.fetch("audit").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_from_yaml_config() {
    let key = Crypto::generate_base64_key();
    let yaml = format!(
        r#"
default_repository: main
encryption_key: "{key}"
migration_resolution: strict
defaults:
  string: "n/a"
repositories:
  main:
    driver: memory
  mail:
    driver: database
    url: "sqlite::memory:"
"#
    );
    let config = Config::from_figment(Figment::new().merge(Yaml::string(&yaml))).unwrap();
    let store = SettingsStore::from_config(&config).await.unwrap();

    let mail = store.load::<MailSettings>().await;
    assert!(mail.is_err(), "Sender composite is not registered");

    let mut general = store.load::<GeneralSettings>().await.unwrap();
    assert_eq!(general.config().repository_name(), "main");
    general.save().await.unwrap();

    assert!(store.migrator_for("mail").is_ok());
    assert!(matches!(
        store.migrator_for("nope").unwrap_err(),
        SettingsError::Config { .. }
    ));
}

#[tokio::test]
async fn test_scalar_defaults_come_from_config() {
    let repo = Arc::new(InMemorySettingsRepository::new());
    let defaults = typed_settings::ScalarDefaults {
        string: "unset".to_string(),
        ..Default::default()
    };
    let store = SettingsStore::builder()
        .repository("default", repo)
        .crypto(test_crypto())
        .defaults(defaults)
        .composite(common::sender_composite())
        .build();

    let mail = store.load::<MailSettings>().await.unwrap().settings().await.unwrap();
    assert_eq!(mail.password, "unset");
    assert_eq!(mail.host, "localhost");
}
