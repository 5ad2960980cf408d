//! Contract models for the settings store
//!
//! Raw values are what repositories persist; typed values are the
//! `serde_json::Value` shape that a settings struct deserializes from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name → typed value view of one group
pub type PropertyMap = BTreeMap<String, Value>;

/// Name → raw value view of one group, as persisted
pub type RawPropertyMap = BTreeMap<String, RawValue>;

/// Storage-safe representation of a single property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawValue {
    /// Scalar, JSON document or base64 ciphertext
    pub payload: Value,
    /// Whether `payload` was encrypted when it was written
    pub encrypted: bool,
}

impl RawValue {
    /// Plain (unencrypted) payload
    pub fn plain(payload: Value) -> Self {
        Self {
            payload,
            encrypted: false,
        }
    }

    /// Ciphertext payload
    pub fn sealed(ciphertext: String) -> Self {
        Self {
            payload: Value::String(ciphertext),
            encrypted: true,
        }
    }
}

/// Declared type of a property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    String,
    /// Arbitrary JSON document, stored verbatim
    Json,
    /// `chrono::DateTime<Utc>`, typed form is RFC 3339
    DateTime,
    /// Unit-variant enum; members in declaration order
    Enum(&'static [&'static str]),
    /// Nested type registered in the cast registry under this name
    Composite(&'static str),
    /// Homogeneous collection
    List(Box<PropertyType>),
    /// Value may be `null`
    Nullable(Box<PropertyType>),
}

impl PropertyType {
    pub fn list(inner: PropertyType) -> Self {
        Self::List(Box::new(inner))
    }

    /// Wrap `self` so that `null` is a valid value
    pub fn nullable(self) -> Self {
        match self {
            Self::Nullable(_) => self,
            other => Self::Nullable(Box::new(other)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    /// Human readable name used in error messages
    pub fn type_name(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::String => "string".to_string(),
            Self::Json => "json".to_string(),
            Self::DateTime => "datetime".to_string(),
            Self::Enum(members) => format!("enum({})", members.join("|")),
            Self::Composite(name) => (*name).to_string(),
            Self::List(inner) => format!("list<{}>", inner.type_name()),
            Self::Nullable(inner) => format!("?{}", inner.type_name()),
        }
    }
}

/// Declared property of a settings type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: PropertyType,
    /// Declared default in typed form
    pub default: Option<Value>,
    /// Filled in from the settings type's `encrypted()` list
    pub encrypted: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            encrypted: false,
        }
    }

    /// Attach a declared default
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// A property to seed through a migration: raw default plus encryption flag
#[derive(Debug, Clone, PartialEq)]
pub struct SeedColumn {
    pub name: String,
    pub default: Value,
    pub encrypted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_is_not_nested_twice() {
        let ty = PropertyType::Int.nullable().nullable();
        assert_eq!(ty, PropertyType::Nullable(Box::new(PropertyType::Int)));
        assert!(ty.is_nullable());
    }

    #[test]
    fn type_names_are_readable() {
        let ty = PropertyType::list(PropertyType::Enum(&["a", "b"])).nullable();
        assert_eq!(ty.type_name(), "?list<enum(a|b)>");
    }
}
