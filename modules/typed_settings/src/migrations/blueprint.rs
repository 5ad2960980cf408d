//! Declarative schema operations for one settings group

use crate::contract::PropertyType;
use serde_json::Value;

/// Transformation applied to a stored value by [`SettingsBlueprint::update`]
pub type UpdateFn = Box<dyn FnOnce(Value) -> Value + Send>;

pub enum OperationKind {
    /// Insert; with `if_absent` an existing property is left alone
    Add { if_absent: bool },
    /// Remove; with `if_present` a missing property is not an error
    Delete { if_present: bool },
    /// Move the value to another name
    Rename { to: String },
    /// Rewrite the stored value (decrypted while the closure runs)
    Update(UpdateFn),
    /// Store the current value as ciphertext
    Encrypt,
    /// Store the current value in plain form
    Decrypt,
}

impl std::fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add { if_absent } => f.debug_struct("Add").field("if_absent", if_absent).finish(),
            Self::Delete { if_present } => f
                .debug_struct("Delete")
                .field("if_present", if_present)
                .finish(),
            Self::Rename { to } => f.debug_struct("Rename").field("to", to).finish(),
            Self::Update(_) => f.write_str("Update"),
            Self::Encrypt => f.write_str("Encrypt"),
            Self::Decrypt => f.write_str("Decrypt"),
        }
    }
}

#[derive(Debug)]
pub struct BlueprintOperation {
    pub kind: OperationKind,
    pub name: String,
    /// Raw default for `Add`
    pub default: Option<Value>,
    /// When set, `default` is validated and normalized with this type's cast
    pub target_type: Option<PropertyType>,
    pub encrypted: bool,
}

impl BlueprintOperation {
    fn new(kind: OperationKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            default: None,
            target_type: None,
            encrypted: false,
        }
    }
}

/// Ordered operations against one group
#[derive(Debug)]
pub struct SettingsBlueprint {
    group: String,
    operations: Vec<BlueprintOperation>,
}

impl SettingsBlueprint {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            operations: Vec::new(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn operations(&self) -> &[BlueprintOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<BlueprintOperation> {
        self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn push_add(&mut self, name: &str, default: Value, encrypted: bool, if_absent: bool) -> &mut BlueprintOperation {
        let mut op = BlueprintOperation::new(OperationKind::Add { if_absent }, name);
        op.default = Some(default);
        op.encrypted = encrypted;
        self.operations.push(op);
        let last = self.operations.len() - 1;
        &mut self.operations[last]
    }

    /// Insert `name`; fails with `PropertyAlreadyExists` if present
    pub fn add(&mut self, name: &str, default: impl Into<Value>, encrypted: bool) -> &mut Self {
        self.push_add(name, default.into(), encrypted, false);
        self
    }

    pub fn add_encrypted(&mut self, name: &str, default: impl Into<Value>) -> &mut Self {
        self.add(name, default, true)
    }

    /// Insert `name` unless it is already persisted
    pub fn add_if_not_exists(
        &mut self,
        name: &str,
        default: impl Into<Value>,
        encrypted: bool,
    ) -> &mut Self {
        self.push_add(name, default.into(), encrypted, true);
        self
    }

    /// Like [`Self::add_if_not_exists`] with the default cast as `ty` first
    pub fn add_typed_if_not_exists(
        &mut self,
        name: &str,
        default: impl Into<Value>,
        ty: PropertyType,
        encrypted: bool,
    ) -> &mut Self {
        self.push_add(name, default.into(), encrypted, true).target_type = Some(ty);
        self
    }

    /// Remove `name`; fails with `PropertyNotFound` if absent
    pub fn delete(&mut self, name: &str) -> &mut Self {
        self.operations.push(BlueprintOperation::new(
            OperationKind::Delete { if_present: false },
            name,
        ));
        self
    }

    pub fn delete_if_exists(&mut self, name: &str) -> &mut Self {
        self.operations.push(BlueprintOperation::new(
            OperationKind::Delete { if_present: true },
            name,
        ));
        self
    }

    /// Move `from` to `to`; no-op if `from` is absent, `RenameConflict` if `to` exists
    pub fn rename(&mut self, from: &str, to: &str) -> &mut Self {
        self.operations.push(BlueprintOperation::new(
            OperationKind::Rename { to: to.to_string() },
            from,
        ));
        self
    }

    /// Rewrite the stored value of `name`; fails with `PropertyNotFound` if absent
    pub fn update(
        &mut self,
        name: &str,
        update: impl FnOnce(Value) -> Value + Send + 'static,
    ) -> &mut Self {
        self.operations.push(BlueprintOperation::new(
            OperationKind::Update(Box::new(update)),
            name,
        ));
        self
    }

    pub fn encrypt(&mut self, name: &str) -> &mut Self {
        self.operations
            .push(BlueprintOperation::new(OperationKind::Encrypt, name));
        self
    }

    pub fn decrypt(&mut self, name: &str) -> &mut Self {
        self.operations
            .push(BlueprintOperation::new(OperationKind::Decrypt, name));
        self
    }
}
