//! Contract error types for the settings store
//!
//! Every variant that concerns a single property carries both the group and
//! the property name so callers can report exactly what failed.

/// Settings store errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Settings type metadata is inconsistent (fatal at startup)
    #[error("invalid settings configuration for group '{group}': {reason}")]
    Config {
        /// Group the metadata belongs to
        group: String,
        /// What is wrong with it
        reason: String,
    },

    /// An encrypted property name is not a declared property
    #[error("encrypted property '{property}' is not declared in group '{group}'")]
    InvalidEncryptedProperty { group: String, property: String },

    /// No cast is registered for a declared composite type
    #[error("no cast registered for type '{type_name}' of property '{property}' in group '{group}'")]
    CastMissing {
        group: String,
        property: String,
        type_name: String,
    },

    /// A value could not be converted between raw and typed form
    #[error("cannot cast property '{property}' in group '{group}': {reason}")]
    CastFailure {
        group: String,
        property: String,
        reason: String,
    },

    /// An encrypted payload could not be decrypted
    #[error("cannot decrypt property '{property}' in group '{group}'")]
    DecryptionFailure { group: String, property: String },

    /// A payload could not be encrypted
    #[error("cannot encrypt property '{property}' in group '{group}'")]
    EncryptionFailure { group: String, property: String },

    /// Transport or storage failure, surfaced uninterpreted
    #[error("settings repository unavailable for group '{group}'")]
    RepositoryUnavailable {
        group: String,
        #[source]
        source: anyhow::Error,
    },

    /// Rename target already exists
    #[error("cannot rename '{from}' to '{to}' in group '{group}': '{to}' already exists")]
    RenameConflict {
        group: String,
        from: String,
        to: String,
    },

    #[error("property '{property}' already exists in group '{group}'")]
    PropertyAlreadyExists { group: String, property: String },

    #[error("property '{property}' does not exist in group '{group}'")]
    PropertyNotFound { group: String, property: String },

    /// Access to a name that is not a declared property
    #[error("'{property}' is not a declared property of group '{group}'")]
    UnknownProperty { group: String, property: String },

    /// Declared property has neither a stored value nor a derivable default
    #[error("property '{property}' in group '{group}' has no value")]
    UninitializedProperty { group: String, property: String },

    /// Strict resolution could not map a migration to a settings type
    #[error("migration '{migration}' does not resolve to a registered settings type")]
    UnresolvedMigration { migration: String },
}

impl SettingsError {
    /// Wrap a backend error as `RepositoryUnavailable` for `group`
    pub fn unavailable(group: &str, source: impl Into<anyhow::Error>) -> Self {
        Self::RepositoryUnavailable {
            group: group.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn config(group: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            group: group.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn cast_failure(group: &str, property: &str, reason: impl ToString) -> Self {
        Self::CastFailure {
            group: group.to_string(),
            property: property.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn uninitialized(group: &str, property: &str) -> Self {
        Self::UninitializedProperty {
            group: group.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn unknown_property(group: &str, property: &str) -> Self {
        Self::UnknownProperty {
            group: group.to_string(),
            property: property.to_string(),
        }
    }

    /// Group the error refers to, if any
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Config { group, .. }
            | Self::InvalidEncryptedProperty { group, .. }
            | Self::CastMissing { group, .. }
            | Self::CastFailure { group, .. }
            | Self::DecryptionFailure { group, .. }
            | Self::EncryptionFailure { group, .. }
            | Self::RepositoryUnavailable { group, .. }
            | Self::RenameConflict { group, .. }
            | Self::PropertyAlreadyExists { group, .. }
            | Self::PropertyNotFound { group, .. }
            | Self::UnknownProperty { group, .. }
            | Self::UninitializedProperty { group, .. } => Some(group),
            Self::UnresolvedMigration { .. } => None,
        }
    }
}

/// Result alias used across the crate
pub type SettingsResult<T> = Result<T, SettingsError>;
