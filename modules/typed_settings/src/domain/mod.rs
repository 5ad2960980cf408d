//! Domain layer - settings metadata, value pipeline and instances

pub mod cast;
pub mod crypto;
pub mod events;
pub mod instance;
pub mod mapper;
pub mod registry;
pub mod repository;
pub mod settings;
pub mod store;

pub use cast::{CastError, CastRegistry, CompositeType, SettingsCast};
pub use crypto::{Crypto, CryptoError};
pub use events::{NoOpEventListener, SettingsEvent, SettingsEventListener};
pub use instance::SettingsInstance;
pub use mapper::{LoadedProperties, PropertyFault, SettingsMapper};
pub use registry::{ConfigRegistry, RepositoryResolver, ResolvedProperty, SettingsConfig};
pub use repository::SettingsRepository;
pub use settings::Settings;
pub use store::{SettingsSchema, SettingsStore, SettingsStoreBuilder};
