//! Typed Settings Module
//!
//! Strongly typed settings groups persisted as name → value pairs in a
//! pluggable repository. Values go through per-property casts on the way
//! in and out, selected properties are encrypted at rest, and individual
//! properties can be locked against overwrites.
//!
//! Stored schemas evolve through settings migrations: blueprints of
//! add / delete / rename operations that a migrator applies idempotently.

// Public exports
pub mod contract;
pub use contract::{
    PropertyDescriptor, PropertyMap, PropertyType, RawPropertyMap, RawValue, SeedColumn,
    SettingsError, SettingsResult,
};

pub mod config;
pub use config::{Config, RepositoryConfig, ResolutionPolicy, ScalarDefaults};

pub mod domain;
pub use domain::{
    CastRegistry, CompositeType, Crypto, Settings, SettingsCast, SettingsEvent,
    SettingsEventListener, SettingsInstance, SettingsRepository, SettingsStore,
};

pub mod migrations;
pub use migrations::{CreateSettingsMigration, SettingsBlueprint, SettingsMigration, SettingsMigrator};

pub mod infra;
pub use infra::storage::{InMemorySettingsRepository, SeaOrmSettingsRepository};
