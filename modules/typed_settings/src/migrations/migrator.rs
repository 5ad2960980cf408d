//! Applies blueprints to a settings repository

use super::blueprint::{BlueprintOperation, OperationKind, SettingsBlueprint};
use crate::contract::{RawValue, SettingsError, SettingsResult};
use crate::domain::cast::CastRegistry;
use crate::domain::crypto::Crypto;
use crate::domain::repository::SettingsRepository;
use serde_json::Value;
use std::sync::Arc;

/// What applying one operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Applied,
    /// Nothing to do, the repository already had the desired state
    Skipped,
}

/// Executes schema operations against one repository
///
/// Every operation maps to a single atomic repository call, so reapplying
/// an `add_if_not_exists`, `delete_if_exists` or `rename` leaves the same
/// end state.
#[derive(Clone)]
pub struct SettingsMigrator {
    repository: Arc<dyn SettingsRepository>,
    crypto: Arc<Crypto>,
    casts: Arc<CastRegistry>,
}

impl std::fmt::Debug for SettingsMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsMigrator").finish_non_exhaustive()
    }
}

impl SettingsMigrator {
    pub fn new(repository: Arc<dyn SettingsRepository>, crypto: Arc<Crypto>) -> Self {
        Self {
            repository,
            crypto,
            casts: Arc::new(CastRegistry::new()),
        }
    }

    /// Casts used to normalize typed defaults (composites included)
    #[must_use]
    pub fn with_casts(mut self, casts: Arc<CastRegistry>) -> Self {
        self.casts = casts;
        self
    }

    /// Build a blueprint for `group` and apply it
    pub async fn in_group(
        &self,
        group: &str,
        build: impl FnOnce(&mut SettingsBlueprint),
    ) -> SettingsResult<Vec<OperationOutcome>> {
        let mut blueprint = SettingsBlueprint::new(group);
        build(&mut blueprint);
        self.apply(blueprint).await
    }

    /// Apply operations in order, stopping at the first failure
    ///
    /// Operations already applied stay applied.
    pub async fn apply(&self, blueprint: SettingsBlueprint) -> SettingsResult<Vec<OperationOutcome>> {
        let group = blueprint.group().to_string();
        let mut outcomes = Vec::with_capacity(blueprint.operations().len());

        for operation in blueprint.into_operations() {
            let name = operation.name.clone();
            let kind = format!("{:?}", operation.kind);
            let outcome = self.apply_operation(&group, operation).await?;

            match outcome {
                OperationOutcome::Applied => {
                    tracing::info!(group = %group, property = %name, operation = %kind, "settings migration applied");
                }
                OperationOutcome::Skipped => {
                    tracing::debug!(group = %group, property = %name, operation = %kind, "settings migration skipped");
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub async fn exists(&self, group: &str, name: &str) -> SettingsResult<bool> {
        self.repository.property_exists(group, name).await
    }

    async fn apply_operation(
        &self,
        group: &str,
        operation: BlueprintOperation,
    ) -> SettingsResult<OperationOutcome> {
        let BlueprintOperation {
            kind,
            name,
            default,
            target_type,
            encrypted,
        } = operation;

        match kind {
            OperationKind::Add { if_absent } => {
                let mut raw = default.unwrap_or(Value::Null);
                if let Some(ty) = &target_type {
                    let cast = self.casts.resolve(ty).map_err(|missing| SettingsError::CastMissing {
                        group: group.to_string(),
                        property: name.clone(),
                        type_name: missing.0,
                    })?;
                    raw = cast
                        .to_raw(raw)
                        .map_err(|e| SettingsError::cast_failure(group, &name, e))?;
                }

                let value = if encrypted {
                    self.seal(group, &name, &raw)?
                } else {
                    RawValue::plain(raw)
                };

                match self.repository.create_property(group, &name, value).await {
                    Ok(()) => Ok(OperationOutcome::Applied),
                    Err(SettingsError::PropertyAlreadyExists { .. }) if if_absent => {
                        Ok(OperationOutcome::Skipped)
                    }
                    Err(e) => Err(e),
                }
            }
            OperationKind::Delete { if_present } => {
                if self.repository.delete_property(group, &name).await? {
                    Ok(OperationOutcome::Applied)
                } else if if_present {
                    Ok(OperationOutcome::Skipped)
                } else {
                    Err(not_found(group, &name))
                }
            }
            OperationKind::Rename { to } => {
                if self.repository.rename_property(group, &name, &to).await? {
                    Ok(OperationOutcome::Applied)
                } else {
                    Ok(OperationOutcome::Skipped)
                }
            }
            OperationKind::Update(update) => {
                let stored = self.stored(group, &name).await?;
                let was_encrypted = stored.encrypted;
                let current = self.open(group, &name, stored)?;
                let updated = update(current);

                let value = if was_encrypted {
                    self.seal(group, &name, &updated)?
                } else {
                    RawValue::plain(updated)
                };
                self.repository.update_property(group, &name, value).await?;
                Ok(OperationOutcome::Applied)
            }
            OperationKind::Encrypt => {
                let stored = self.stored(group, &name).await?;
                if stored.encrypted {
                    return Ok(OperationOutcome::Skipped);
                }
                let value = self.seal(group, &name, &stored.payload)?;
                self.repository.update_property(group, &name, value).await?;
                Ok(OperationOutcome::Applied)
            }
            OperationKind::Decrypt => {
                let stored = self.stored(group, &name).await?;
                if !stored.encrypted {
                    return Ok(OperationOutcome::Skipped);
                }
                let plain = self.open(group, &name, stored)?;
                self.repository
                    .update_property(group, &name, RawValue::plain(plain))
                    .await?;
                Ok(OperationOutcome::Applied)
            }
        }
    }

    async fn stored(&self, group: &str, name: &str) -> SettingsResult<RawValue> {
        self.repository
            .get_property(group, name)
            .await?
            .ok_or_else(|| not_found(group, name))
    }

    fn open(&self, group: &str, name: &str, stored: RawValue) -> SettingsResult<Value> {
        if !stored.encrypted {
            return Ok(stored.payload);
        }
        self.crypto
            .decrypt_payload(&stored.payload)
            .map_err(|_| SettingsError::DecryptionFailure {
                group: group.to_string(),
                property: name.to_string(),
            })
    }

    fn seal(&self, group: &str, name: &str, raw: &Value) -> SettingsResult<RawValue> {
        self.crypto
            .encrypt(raw)
            .map(RawValue::sealed)
            .map_err(|_| SettingsError::EncryptionFailure {
                group: group.to_string(),
                property: name.to_string(),
            })
    }
}

fn not_found(group: &str, name: &str) -> SettingsError {
    SettingsError::PropertyNotFound {
        group: group.to_string(),
        property: name.to_string(),
    }
}
