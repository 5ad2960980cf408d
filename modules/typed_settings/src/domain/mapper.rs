//! Load and save pipeline between repositories and typed property maps
//!
//! Load: repository → decrypt → cast → typed map, falling back to defaults.
//! Save: typed map → cast → encrypt → repository, skipping locked properties.

use super::cast::{CastError, CastRegistry};
use super::crypto::Crypto;
use super::registry::{ResolvedProperty, SettingsConfig};
use crate::config::ScalarDefaults;
use crate::contract::{
    PropertyMap, PropertyType, RawPropertyMap, RawValue, SeedColumn, SettingsError,
    SettingsResult,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Why a single property could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFault {
    Cast(String),
    Decrypt,
}

impl PropertyFault {
    pub fn to_error(&self, group: &str, property: &str) -> SettingsError {
        match self {
            PropertyFault::Cast(reason) => SettingsError::cast_failure(group, property, reason),
            PropertyFault::Decrypt => SettingsError::DecryptionFailure {
                group: group.to_string(),
                property: property.to_string(),
            },
        }
    }
}

/// Result of a load: typed values plus per-property failures
///
/// A property that failed to decrypt or cast is absent from `values` and
/// reported in `faults`; the rest of the group loads normally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedProperties {
    pub values: PropertyMap,
    pub faults: BTreeMap<String, PropertyFault>,
}

pub struct SettingsMapper {
    crypto: Arc<Crypto>,
    casts: Arc<CastRegistry>,
    defaults: ScalarDefaults,
}

impl SettingsMapper {
    pub fn new(crypto: Arc<Crypto>, casts: Arc<CastRegistry>, defaults: ScalarDefaults) -> Self {
        Self {
            crypto,
            casts,
            defaults,
        }
    }

    pub fn crypto(&self) -> &Arc<Crypto> {
        &self.crypto
    }

    /// Every declared property of the group
    pub async fn load(&self, config: &SettingsConfig) -> SettingsResult<LoadedProperties> {
        let raw = config.repository().fetch(config.group()).await?;
        tracing::debug!(group = config.group(), fetched = raw.len(), "settings fetched");
        Ok(self.hydrate(config, config.properties().iter(), raw))
    }

    /// Only the named properties; names that are not declared are ignored
    pub async fn fetch_properties(
        &self,
        config: &SettingsConfig,
        names: &[String],
    ) -> SettingsResult<LoadedProperties> {
        if names.is_empty() {
            return Ok(LoadedProperties::default());
        }
        let raw = config
            .repository()
            .fetch_properties(config.group(), names)
            .await?;
        let selected = config
            .properties()
            .iter()
            .filter(|p| names.contains(&p.descriptor.name));
        Ok(self.hydrate(config, selected, raw))
    }

    fn hydrate<'a>(
        &self,
        config: &SettingsConfig,
        properties: impl Iterator<Item = &'a ResolvedProperty>,
        mut raw: RawPropertyMap,
    ) -> LoadedProperties {
        let mut loaded = LoadedProperties::default();

        for property in properties {
            let name = &property.descriptor.name;
            let value = match raw.remove(name) {
                Some(stored) => match self.decode(property, stored) {
                    Ok(value) => Some(value),
                    Err(fault) => {
                        tracing::warn!(
                            group = config.group(),
                            property = %name,
                            fault = ?fault,
                            "settings property could not be loaded"
                        );
                        loaded.faults.insert(name.clone(), fault);
                        continue;
                    }
                },
                None => match self.resolve_default(property) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(
                            group = config.group(),
                            property = %name,
                            error = %e,
                            "settings property default does not fit its type"
                        );
                        loaded
                            .faults
                            .insert(name.clone(), PropertyFault::Cast(format!("default: {e}")));
                        continue;
                    }
                },
            };

            // Properties without a value stay unset until assigned
            if let Some(value) = value {
                loaded.values.insert(name.clone(), value);
            }
        }

        loaded
    }

    fn decode(&self, property: &ResolvedProperty, stored: RawValue) -> Result<Value, PropertyFault> {
        // The stored flag wins: values written before encryption was enabled
        // are still plain and get encrypted on the next save
        let raw = if stored.encrypted {
            self.crypto
                .decrypt_payload(&stored.payload)
                .map_err(|_| PropertyFault::Decrypt)?
        } else {
            stored.payload
        };

        property
            .cast
            .to_typed(raw)
            .map_err(|e| PropertyFault::Cast(e.to_string()))
    }

    /// Fallback for a property with no stored value
    ///
    /// In order: declared default, `null` for nullable types, the first enum
    /// member, a default-constructed composite, the scalar default table.
    /// The result goes through the property cast, so it matches what a load
    /// would return after saving it.
    pub fn resolve_default(
        &self,
        property: &ResolvedProperty,
    ) -> Result<Option<Value>, CastError> {
        let descriptor = &property.descriptor;
        let fallback = match &descriptor.default {
            Some(default) => Some(default.clone()),
            None => match &descriptor.ty {
                PropertyType::Nullable(_) => Some(Value::Null),
                PropertyType::Enum(members) => {
                    members.first().map(|m| Value::String((*m).to_string()))
                }
                PropertyType::Composite(name) => {
                    self.casts.composite(name).and_then(|c| c.default.clone())
                }
                scalar => self.defaults.for_type(scalar),
            },
        };

        fallback
            .map(|value| property.cast.to_raw(value).and_then(|raw| property.cast.to_typed(raw)))
            .transpose()
    }

    /// Persist every unlocked property and return the canonical state
    ///
    /// Casting and encryption run for all properties before anything is
    /// written, so a failure leaves the repository untouched. Locked
    /// properties keep the value from `original`.
    pub async fn save(
        &self,
        config: &SettingsConfig,
        values: &PropertyMap,
        original: &PropertyMap,
    ) -> SettingsResult<PropertyMap> {
        let group = config.group();
        let locked = config.locked().await?;

        let mut raw_values = RawPropertyMap::new();
        let mut merged = PropertyMap::new();

        for property in config.properties() {
            let name = &property.descriptor.name;

            if locked.contains(name) {
                if let Some(previous) = original.get(name) {
                    merged.insert(name.clone(), previous.clone());
                }
                continue;
            }

            let value = values
                .get(name)
                .ok_or_else(|| SettingsError::uninitialized(group, name))?;

            let raw = property
                .cast
                .to_raw(value.clone())
                .map_err(|e| SettingsError::cast_failure(group, name, e))?;
            let canonical = property
                .cast
                .to_typed(raw.clone())
                .map_err(|e| SettingsError::cast_failure(group, name, e))?;

            let stored = if property.descriptor.encrypted {
                let ciphertext =
                    self.crypto
                        .encrypt(&raw)
                        .map_err(|_| SettingsError::EncryptionFailure {
                            group: group.to_string(),
                            property: name.clone(),
                        })?;
                RawValue::sealed(ciphertext)
            } else {
                RawValue::plain(raw)
            };

            raw_values.insert(name.clone(), stored);
            merged.insert(name.clone(), canonical);
        }

        config.repository().save(group, &raw_values).await?;
        tracing::debug!(
            group,
            saved = raw_values.len(),
            locked = locked.len(),
            "settings saved"
        );

        Ok(merged)
    }

    /// Raw defaults for every declared property, used to seed migrations
    ///
    /// Properties without any derivable default are skipped.
    pub fn columns(&self, config: &SettingsConfig) -> SettingsResult<Vec<SeedColumn>> {
        let mut columns = Vec::with_capacity(config.properties().len());

        for property in config.properties() {
            let name = &property.descriptor.name;
            let default = self
                .resolve_default(property)
                .map_err(|e| SettingsError::cast_failure(config.group(), name, e))?;
            let Some(default) = default else {
                tracing::warn!(
                    group = config.group(),
                    property = %name,
                    "no default to seed settings property with, skipping"
                );
                continue;
            };

            let raw = property
                .cast
                .to_raw(default)
                .map_err(|e| SettingsError::cast_failure(config.group(), name, e))?;
            columns.push(SeedColumn {
                name: name.clone(),
                default: raw,
                encrypted: property.descriptor.encrypted,
            });
        }

        Ok(columns)
    }

    /// Typed map with encrypted properties replaced by ciphertext
    pub fn seal(&self, config: &SettingsConfig, values: &PropertyMap) -> SettingsResult<PropertyMap> {
        values
            .iter()
            .map(|(name, value)| {
                if !config.is_encrypted(name) {
                    return Ok((name.clone(), value.clone()));
                }
                self.crypto
                    .encrypt(value)
                    .map(|sealed| (name.clone(), Value::String(sealed)))
                    .map_err(|_| SettingsError::EncryptionFailure {
                        group: config.group().to_string(),
                        property: name.clone(),
                    })
            })
            .collect()
    }

    /// Inverse of [`Self::seal`]
    pub fn unseal(&self, config: &SettingsConfig, sealed: PropertyMap) -> SettingsResult<PropertyMap> {
        sealed
            .into_iter()
            .map(|(name, value)| {
                if !config.is_encrypted(&name) {
                    return Ok((name, value));
                }
                match self.crypto.decrypt_payload(&value) {
                    Ok(plain) => Ok((name, plain)),
                    Err(_) => Err(SettingsError::DecryptionFailure {
                        group: config.group().to_string(),
                        property: name,
                    }),
                }
            })
            .collect()
    }
}
