//! Contract layer - public types shared by every other layer
//!
//! Transport-agnostic models and the error taxonomy.

pub mod error;
pub mod model;

pub use error::{SettingsError, SettingsResult};
pub use model::{
    PropertyDescriptor, PropertyMap, PropertyType, RawPropertyMap, RawValue, SeedColumn,
};
