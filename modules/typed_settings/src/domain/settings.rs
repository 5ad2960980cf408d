//! The trait application settings types implement
//!
//! A settings type is a plain serde struct plus a static property table.
//! The table is the only metadata the store consumes.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct GeneralSettings {
//!     site_name: String,
//!     theme: Theme,
//!     smtp_password: Option<String>,
//! }
//!
//! impl Settings for GeneralSettings {
//!     fn group() -> &'static str {
//!         "general"
//!     }
//!
//!     fn properties() -> Vec<PropertyDescriptor> {
//!         vec![
//!             PropertyDescriptor::new("site_name", PropertyType::String).default_value("Acme"),
//!             PropertyDescriptor::new("theme", PropertyType::Enum(&["light", "dark"])),
//!             PropertyDescriptor::new("smtp_password", PropertyType::String.nullable()),
//!         ]
//!     }
//!
//!     fn encrypted() -> &'static [&'static str] {
//!         &["smtp_password"]
//!     }
//! }
//! ```

use super::cast::SettingsCast;
use crate::contract::{PropertyDescriptor, PropertyMap};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub trait Settings: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage namespace; stable across migrations
    fn group() -> &'static str;

    /// Declared properties in declaration order
    fn properties() -> Vec<PropertyDescriptor>;

    /// Name used to match "Create…" migrations, defaults to the type name
    fn name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Per-property cast overrides
    fn casts() -> Vec<(&'static str, Arc<dyn SettingsCast>)> {
        Vec::new()
    }

    /// Properties stored as ciphertext
    fn encrypted() -> &'static [&'static str] {
        &[]
    }

    /// Named repository; `None` selects the default one
    fn repository() -> Option<&'static str> {
        None
    }

    /// Defaults in typed form for properties without a declared default
    fn defaults() -> PropertyMap {
        PropertyMap::new()
    }
}
