//! Casts between raw (stored) and typed (in-memory) property values
//!
//! Typed values are the JSON shape a settings struct deserializes from, so
//! serde does the final step into Rust types. A cast only has to make the
//! stored form and that shape agree.

use crate::contract::PropertyType;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CastError(String);

impl CastError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Bidirectional transform for one property
pub trait SettingsCast: Send + Sync + fmt::Debug {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError>;
    fn to_raw(&self, typed: Value) -> Result<Value, CastError>;
}

// ===== Built-in casts =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
}

/// Coerces stored scalars to the declared scalar type
#[derive(Debug, Clone, Copy)]
pub struct ScalarCast(pub ScalarKind);

impl ScalarCast {
    fn coerce(&self, value: Value) -> Result<Value, CastError> {
        let coerced = match (self.0, &value) {
            (ScalarKind::Bool, Value::Bool(_)) => Some(value.clone()),
            (ScalarKind::Bool, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            (ScalarKind::Bool, Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            (ScalarKind::Int, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Some(value.clone())
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64))
                }
            }
            (ScalarKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            // Integral numbers stay as written so stored payloads are left alone
            (ScalarKind::Float, Value::Number(_)) => Some(value.clone()),
            (ScalarKind::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (ScalarKind::String, Value::String(_)) => Some(value.clone()),
            (ScalarKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ScalarKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            _ => None,
        };

        coerced.ok_or_else(|| CastError(format!("{value} is not a valid {:?}", self.0)))
    }
}

impl SettingsCast for ScalarCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        self.coerce(raw)
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        self.coerce(typed)
    }
}

/// Stores the document unchanged
#[derive(Debug, Clone, Copy)]
pub struct JsonCast;

impl SettingsCast for JsonCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        Ok(raw)
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        Ok(typed)
    }
}

/// `DateTime<Utc>`; typed form is RFC 3339, stored form uses `format`
#[derive(Debug, Clone, Default)]
pub struct DateTimeCast {
    format: Option<String>,
}

impl DateTimeCast {
    /// Store with a chrono format string instead of RFC 3339
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
        }
    }

    fn parse(&self, value: &Value) -> Result<DateTime<Utc>, CastError> {
        let invalid = || CastError(format!("{value} is not a valid datetime"));
        match value {
            Value::String(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Ok(dt.with_timezone(&Utc));
                }
                let format = self.format.as_deref().ok_or_else(invalid)?;
                DateTime::parse_from_str(s, format)
                    .map(|dt| dt.with_timezone(&Utc))
                    .or_else(|_| NaiveDateTime::parse_from_str(s, format).map(|n| n.and_utc()))
                    .map_err(|_| invalid())
            }
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

impl SettingsCast for DateTimeCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        let dt = self.parse(&raw)?;
        Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        let dt = self.parse(&typed)?;
        let stored = match &self.format {
            Some(format) => dt.format(format).to_string(),
            None => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };
        Ok(Value::String(stored))
    }
}

/// Unit-variant enum stored by member name
#[derive(Debug, Clone)]
pub struct EnumCast {
    members: &'static [&'static str],
}

impl EnumCast {
    pub fn new(members: &'static [&'static str]) -> Self {
        Self { members }
    }

    fn check(&self, value: Value) -> Result<Value, CastError> {
        match &value {
            Value::String(s) if self.members.contains(&s.as_str()) => Ok(value),
            _ => Err(CastError(format!(
                "{value} is not one of [{}]",
                self.members.join(", ")
            ))),
        }
    }
}

impl SettingsCast for EnumCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        self.check(raw)
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        self.check(typed)
    }
}

/// Homogeneous collection; every element goes through `inner`
#[derive(Debug, Clone)]
pub struct CollectionCast {
    inner: Arc<dyn SettingsCast>,
}

impl CollectionCast {
    pub fn new(inner: Arc<dyn SettingsCast>) -> Self {
        Self { inner }
    }

    fn each(
        value: Value,
        f: impl Fn(Value) -> Result<Value, CastError>,
    ) -> Result<Value, CastError> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| f(item).map_err(|e| CastError(format!("[{i}]: {e}"))))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(CastError(format!("{other} is not a list"))),
        }
    }
}

impl SettingsCast for CollectionCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        Self::each(raw, |item| self.inner.to_typed(item))
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        Self::each(typed, |item| self.inner.to_raw(item))
    }
}

#[derive(Debug, Clone)]
pub struct NullableCast {
    inner: Arc<dyn SettingsCast>,
}

impl NullableCast {
    pub fn new(inner: Arc<dyn SettingsCast>) -> Self {
        Self { inner }
    }
}

impl SettingsCast for NullableCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        match raw {
            Value::Null => Ok(Value::Null),
            other => self.inner.to_typed(other),
        }
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        match typed {
            Value::Null => Ok(Value::Null),
            other => self.inner.to_raw(other),
        }
    }
}

/// Nested document; each known field goes through its own cast
#[derive(Debug, Clone)]
pub struct CompositeCast {
    name: &'static str,
    fields: Vec<(String, Arc<dyn SettingsCast>)>,
}

impl CompositeCast {
    fn map_fields(
        &self,
        value: Value,
        f: impl Fn(&dyn SettingsCast, Value) -> Result<Value, CastError>,
    ) -> Result<Value, CastError> {
        let Value::Object(mut object) = value else {
            return Err(CastError(format!("{value} is not a {} document", self.name)));
        };

        for (field, cast) in &self.fields {
            if let Some(inner) = object.remove(field) {
                let cast_value = f(cast.as_ref(), inner)
                    .map_err(|e| CastError(format!("{}.{field}: {e}", self.name)))?;
                object.insert(field.clone(), cast_value);
            }
        }
        Ok(Value::Object(object))
    }
}

impl SettingsCast for CompositeCast {
    fn to_typed(&self, raw: Value) -> Result<Value, CastError> {
        self.map_fields(raw, |cast, v| cast.to_typed(v))
    }

    fn to_raw(&self, typed: Value) -> Result<Value, CastError> {
        self.map_fields(typed, |cast, v| cast.to_raw(v))
    }
}

// ===== Registry =====

/// Nested type known to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeType {
    pub name: &'static str,
    pub fields: Vec<(String, PropertyType)>,
    /// Default-constructed instance in typed form
    pub default: Option<Value>,
}

impl CompositeType {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            default: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: PropertyType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Use `T::default()` as the default-constructed instance
    pub fn default_from<T: Default + Serialize>(self) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(T::default())?;
        Ok(self.default_value(value))
    }
}

/// Type name that has no cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCast(pub String);

/// Resolves declared property types to casts
#[derive(Debug, Clone, Default)]
pub struct CastRegistry {
    composites: HashMap<&'static str, CompositeType>,
}

impl CastRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, composite: CompositeType) -> &mut Self {
        self.composites.insert(composite.name, composite);
        self
    }

    pub fn composite(&self, name: &str) -> Option<&CompositeType> {
        self.composites.get(name)
    }

    pub fn resolve(&self, ty: &PropertyType) -> Result<Arc<dyn SettingsCast>, MissingCast> {
        self.resolve_inner(ty, &mut Vec::new())
    }

    fn resolve_inner(
        &self,
        ty: &PropertyType,
        visiting: &mut Vec<&'static str>,
    ) -> Result<Arc<dyn SettingsCast>, MissingCast> {
        let cast: Arc<dyn SettingsCast> = match ty {
            PropertyType::Bool => Arc::new(ScalarCast(ScalarKind::Bool)),
            PropertyType::Int => Arc::new(ScalarCast(ScalarKind::Int)),
            PropertyType::Float => Arc::new(ScalarCast(ScalarKind::Float)),
            PropertyType::String => Arc::new(ScalarCast(ScalarKind::String)),
            PropertyType::Json => Arc::new(JsonCast),
            PropertyType::DateTime => Arc::new(DateTimeCast::default()),
            PropertyType::Enum(members) => Arc::new(EnumCast::new(members)),
            PropertyType::List(inner) => {
                Arc::new(CollectionCast::new(self.resolve_inner(inner, visiting)?))
            }
            PropertyType::Nullable(inner) => {
                Arc::new(NullableCast::new(self.resolve_inner(inner, visiting)?))
            }
            PropertyType::Composite(name) => {
                // Self-referencing composites cannot be cast eagerly
                if visiting.contains(name) {
                    return Err(MissingCast((*name).to_string()));
                }
                let composite = self
                    .composites
                    .get(name)
                    .ok_or_else(|| MissingCast((*name).to_string()))?;

                visiting.push(name);
                let fields = composite
                    .fields
                    .iter()
                    .map(|(field, field_ty)| {
                        self.resolve_inner(field_ty, visiting)
                            .map(|cast| (field.clone(), cast))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                visiting.pop();

                Arc::new(CompositeCast { name, fields })
            }
        };
        Ok(cast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn registry() -> CastRegistry {
        let mut registry = CastRegistry::new();
        registry
            .register(
                CompositeType::new("Address")
                    .field("street", PropertyType::String)
                    .field("zip", PropertyType::Int),
            )
            .register(
                CompositeType::new("Office")
                    .field("address", PropertyType::Composite("Address"))
                    .field("opened_at", PropertyType::DateTime)
                    .field("tags", PropertyType::list(PropertyType::String)),
            );
        registry
    }

    fn round_trip(ty: PropertyType, typed: Value) {
        let cast = registry().resolve(&ty).unwrap();
        let raw = cast.to_raw(typed.clone()).unwrap();
        assert_eq!(cast.to_typed(raw.clone()).unwrap(), typed, "typed round trip of {ty:?}");
        assert_eq!(cast.to_raw(cast.to_typed(raw.clone()).unwrap()).unwrap(), raw);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(PropertyType::Bool, json!(true));
        round_trip(PropertyType::Int, json!(-17));
        round_trip(PropertyType::Float, json!(2.5));
        round_trip(PropertyType::Float, json!(1));
        round_trip(PropertyType::String, json!("hello"));
        round_trip(PropertyType::Json, json!({"free": ["form", 1]}));
    }

    #[test]
    fn scalars_are_coerced_from_stored_strings() {
        let registry = registry();
        let int = registry.resolve(&PropertyType::Int).unwrap();
        assert_eq!(int.to_typed(json!("42")).unwrap(), json!(42));
        assert_eq!(int.to_typed(json!(3.0)).unwrap(), json!(3));
        assert!(int.to_typed(json!(3.5)).is_err());

        let flag = registry.resolve(&PropertyType::Bool).unwrap();
        assert_eq!(flag.to_typed(json!("1")).unwrap(), json!(true));
        assert_eq!(flag.to_typed(json!(0)).unwrap(), json!(false));
        assert!(flag.to_typed(json!("maybe")).is_err());

        let float = registry.resolve(&PropertyType::Float).unwrap();
        assert_eq!(float.to_typed(json!(1)).unwrap(), json!(1));
        assert_eq!(float.to_raw(json!(1)).unwrap(), json!(1));
        assert_eq!(float.to_typed(json!(1.5)).unwrap(), json!(1.5));
        assert_eq!(float.to_typed(json!("0.25")).unwrap(), json!(0.25));
        assert!(float.to_typed(json!("fast")).is_err());

        let text = registry.resolve(&PropertyType::String).unwrap();
        assert_eq!(text.to_typed(json!(12)).unwrap(), json!("12"));
        assert!(text.to_typed(json!(null)).is_err());
    }

    #[test]
    fn enums_reject_unknown_members() {
        let cast = registry()
            .resolve(&PropertyType::Enum(&["light", "dark"]))
            .unwrap();
        assert_eq!(cast.to_typed(json!("dark")).unwrap(), json!("dark"));
        assert!(cast.to_typed(json!("sepia")).is_err());
        assert!(cast.to_raw(json!(1)).is_err());
    }

    #[test]
    fn nested_composites_and_collections_round_trip() {
        round_trip(
            PropertyType::list(PropertyType::Composite("Office")),
            json!([
                {
                    "address": {"street": "Main St", "zip": 1000},
                    "opened_at": "2024-03-01T09:30:00Z",
                    "tags": ["hq", "sales"]
                },
                {
                    "address": {"street": "Side St", "zip": 2000},
                    "opened_at": "2021-12-31T23:59:59.250Z",
                    "tags": []
                }
            ]),
        );
        round_trip(PropertyType::Composite("Address").nullable(), json!(null));
    }

    #[test]
    fn composite_fields_are_cast_individually() {
        let cast = registry().resolve(&PropertyType::Composite("Address")).unwrap();
        let typed = cast
            .to_typed(json!({"street": "Main St", "zip": "1000"}))
            .unwrap();
        assert_eq!(typed, json!({"street": "Main St", "zip": 1000}));

        let err = cast.to_typed(json!({"zip": "north"})).unwrap_err();
        assert!(err.to_string().starts_with("Address.zip"));
    }

    #[test]
    fn datetime_uses_storage_format() {
        let cast = DateTimeCast::with_format("%Y-%m-%d %H:%M:%S");
        let raw = cast.to_raw(json!("2024-03-01T09:30:00Z")).unwrap();
        assert_eq!(raw, json!("2024-03-01 09:30:00"));
        assert_eq!(cast.to_typed(raw).unwrap(), json!("2024-03-01T09:30:00Z"));
        assert_eq!(cast.to_typed(json!(0)).unwrap(), json!("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn typed_datetime_matches_chrono_serde() {
        #[derive(Deserialize, Serialize)]
        struct Stamp(DateTime<Utc>);

        let typed = DateTimeCast::default()
            .to_typed(json!("2024-03-01T10:30:00.5+01:00"))
            .unwrap();
        let stamp: Stamp = serde_json::from_value(typed.clone()).unwrap();
        assert_eq!(serde_json::to_value(stamp).unwrap(), typed);
    }

    #[test]
    fn unregistered_composites_are_missing() {
        let registry = registry();
        assert_eq!(
            registry
                .resolve(&PropertyType::list(PropertyType::Composite("Invoice")))
                .unwrap_err(),
            MissingCast("Invoice".to_string())
        );
    }

    #[test]
    fn recursive_composites_are_rejected() {
        let mut registry = CastRegistry::new();
        registry.register(
            CompositeType::new("Node").field("next", PropertyType::Composite("Node").nullable()),
        );
        assert!(registry.resolve(&PropertyType::Composite("Node")).is_err());
    }

    #[test]
    fn composite_default_from_type_default() {
        #[derive(Default, Serialize)]
        struct Smtp {
            host: String,
            port: u16,
        }

        let composite = CompositeType::new("Smtp").default_from::<Smtp>().unwrap();
        assert_eq!(composite.default, Some(json!({"host": "", "port": 0})));
    }
}
