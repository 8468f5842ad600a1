//! Core value types for tfplug
//!
//! Terraform hands every configuration, plan and state to the provider as a
//! msgpack-encoded object. `Dynamic` is the decoded tree, `DynamicValue` wraps
//! it with path-based accessors.

use crate::error::{Result, TfplugError};
use serde::de::{self, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Dynamic represents a Terraform value of any type
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    Null,
    Bool(bool),
    /// Terraform numbers are arbitrary precision; f64 covers every attribute we declare
    Number(f64),
    String(String),
    /// Lists and sets (including nested blocks) share this representation
    List(Vec<Dynamic>),
    /// Objects and maps
    Map(HashMap<String, Dynamic>),
    /// Value not yet known during planning
    Unknown,
}

impl Dynamic {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dynamic::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Dynamic::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Dynamic::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Dynamic]> {
        match self {
            Dynamic::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Dynamic>> {
        match self {
            Dynamic::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Dynamic::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dynamic::Unknown)
    }

    /// True when neither this value nor anything nested in it is unknown
    pub fn is_fully_known(&self) -> bool {
        match self {
            Dynamic::Unknown => false,
            Dynamic::List(items) => items.iter().all(Dynamic::is_fully_known),
            Dynamic::Map(map) => map.values().all(Dynamic::is_fully_known),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "bool",
            Dynamic::Number(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "map",
            Dynamic::Unknown => "unknown",
        }
    }
}

impl From<&str> for Dynamic {
    fn from(value: &str) -> Self {
        Dynamic::String(value.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(value: String) -> Self {
        Dynamic::String(value)
    }
}

impl From<bool> for Dynamic {
    fn from(value: bool) -> Self {
        Dynamic::Bool(value)
    }
}

impl From<i64> for Dynamic {
    fn from(value: i64) -> Self {
        Dynamic::Number(value as f64)
    }
}

/// msgpack extension type Terraform uses for unknown values
const UNKNOWN_EXT_TYPE: i8 = 0;

/// Encodes as msgpack `fixext1` type 0, the marker cty uses for unknowns
struct UnknownExt;

struct ExtPayload(&'static [u8]);

impl Serialize for ExtPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl Serialize for UnknownExt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&UNKNOWN_EXT_TYPE)?;
        tuple.serialize_element(&ExtPayload(&[0]))?;
        tuple.end()
    }
}

impl Serialize for Dynamic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Dynamic::Null => serializer.serialize_unit(),
            Dynamic::Bool(b) => serializer.serialize_bool(*b),
            Dynamic::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Dynamic::String(s) => serializer.serialize_str(s),
            Dynamic::List(l) => l.serialize(serializer),
            Dynamic::Map(m) => m.serialize(serializer),
            Dynamic::Unknown => {
                serializer.serialize_newtype_struct(rmp_serde::MSGPACK_EXT_STRUCT_NAME, &UnknownExt)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DynamicVisitor;

        impl<'de> Visitor<'de> for DynamicVisitor {
            type Value = Dynamic;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a terraform value")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Null)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Null)
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Bool(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value as f64))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::Number(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::String(value.to_string()))
            }

            fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<Dynamic, E> {
                Ok(Dynamic::String(value))
            }

            // rmp-serde surfaces msgpack extensions as newtype structs; the only
            // extension Terraform sends is the unknown marker.
            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> std::result::Result<Dynamic, D::Error> {
                de::IgnoredAny::deserialize(deserializer)?;
                Ok(Dynamic::Unknown)
            }

            fn visit_seq<V: de::SeqAccess<'de>>(
                self,
                mut seq: V,
            ) -> std::result::Result<Dynamic, V::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Dynamic::List(items))
            }

            fn visit_map<V: de::MapAccess<'de>>(
                self,
                mut map: V,
            ) -> std::result::Result<Dynamic, V::Error> {
                let mut values = HashMap::new();
                while let Some((key, value)) = map.next_entry::<String, Dynamic>()? {
                    values.insert(key, value);
                }
                Ok(Dynamic::Map(values))
            }
        }

        deserializer.deserialize_any(DynamicVisitor)
    }
}

/// DynamicValue wraps Dynamic with encoding and path-based access
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicValue {
    pub value: Dynamic,
}

impl DynamicValue {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn null() -> Self {
        Self::new(Dynamic::Null)
    }

    /// An empty object, the usual starting point when building state
    pub fn object() -> Self {
        Self::new(Dynamic::Map(HashMap::new()))
    }

    pub fn encode_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(&self.value)
            .map_err(|e| TfplugError::EncodingError(format!("msgpack encoding failed: {}", e)))
    }

    pub fn decode_msgpack(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::null());
        }
        let value = rmp_serde::from_slice(data)
            .map_err(|e| TfplugError::DecodingError(format!("msgpack decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    pub fn decode_json(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::null());
        }
        let value = serde_json::from_slice(data)
            .map_err(|e| TfplugError::DecodingError(format!("json decoding failed: {}", e)))?;
        Ok(Self { value })
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn get(&self, path: &AttributePath) -> Result<&Dynamic> {
        let mut current = &self.value;

        for step in &path.steps {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .get(name)
                    .ok_or_else(|| TfplugError::InvalidState(format!("attribute '{}' not found", name)))?,
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => l
                    .get(*idx as usize)
                    .ok_or_else(|| TfplugError::InvalidState(format!("index {} out of bounds", idx)))?,
                (value, _) => {
                    return Err(TfplugError::InvalidState(format!(
                        "cannot navigate into {} at {}",
                        value.type_name(),
                        path
                    )))
                }
            };
        }

        Ok(current)
    }

    pub fn get_string(&self, path: &AttributePath) -> Result<String> {
        match self.get(path)? {
            Dynamic::String(s) => Ok(s.clone()),
            other => Err(type_mismatch("string", other)),
        }
    }

    pub fn get_bool(&self, path: &AttributePath) -> Result<bool> {
        match self.get(path)? {
            Dynamic::Bool(b) => Ok(*b),
            other => Err(type_mismatch("bool", other)),
        }
    }

    pub fn get_number(&self, path: &AttributePath) -> Result<f64> {
        match self.get(path)? {
            Dynamic::Number(n) => Ok(*n),
            other => Err(type_mismatch("number", other)),
        }
    }

    /// Null lists come back empty, since absent blocks are encoded as null or []
    pub fn get_list(&self, path: &AttributePath) -> Result<Vec<Dynamic>> {
        match self.get(path)? {
            Dynamic::List(items) => Ok(items.clone()),
            Dynamic::Null => Ok(Vec::new()),
            other => Err(type_mismatch("list", other)),
        }
    }

    pub fn set(&mut self, path: &AttributePath, new_value: Dynamic) -> Result<()> {
        let Some((last, parents)) = path.steps.split_last() else {
            self.value = new_value;
            return Ok(());
        };

        if self.value.is_null() {
            self.value = Dynamic::Map(HashMap::new());
        }

        let mut current = &mut self.value;
        for step in parents {
            current = match (current, step) {
                (Dynamic::Map(m), AttributePathStep::AttributeName(name))
                | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => m
                    .entry(name.clone())
                    .or_insert_with(|| Dynamic::Map(HashMap::new())),
                (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => l
                    .get_mut(*idx as usize)
                    .ok_or_else(|| TfplugError::InvalidState(format!("index {} out of bounds", idx)))?,
                (value, _) => {
                    return Err(TfplugError::InvalidState(format!(
                        "cannot navigate into {} at {}",
                        value.type_name(),
                        path
                    )))
                }
            };
        }

        match (current, last) {
            (Dynamic::Map(m), AttributePathStep::AttributeName(name))
            | (Dynamic::Map(m), AttributePathStep::ElementKeyString(name)) => {
                m.insert(name.clone(), new_value);
                Ok(())
            }
            (Dynamic::List(l), AttributePathStep::ElementKeyInt(idx)) => {
                let slot = l
                    .get_mut(*idx as usize)
                    .ok_or_else(|| TfplugError::InvalidState(format!("index {} out of bounds", idx)))?;
                *slot = new_value;
                Ok(())
            }
            (value, _) => Err(TfplugError::InvalidState(format!(
                "cannot set into {} at {}",
                value.type_name(),
                path
            ))),
        }
    }

    pub fn set_string(&mut self, path: &AttributePath, value: impl Into<String>) -> Result<()> {
        self.set(path, Dynamic::String(value.into()))
    }

    pub fn set_bool(&mut self, path: &AttributePath, value: bool) -> Result<()> {
        self.set(path, Dynamic::Bool(value))
    }

    pub fn set_number(&mut self, path: &AttributePath, value: f64) -> Result<()> {
        self.set(path, Dynamic::Number(value))
    }

    pub fn set_list(&mut self, path: &AttributePath, value: Vec<Dynamic>) -> Result<()> {
        self.set(path, Dynamic::List(value))
    }
}

fn type_mismatch(expected: &str, actual: &Dynamic) -> TfplugError {
    TfplugError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

/// AttributePath points at a value inside a DynamicValue
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub steps: Vec<AttributePathStep>,
}

impl AttributePath {
    pub fn new(name: &str) -> Self {
        Self {
            steps: vec![AttributePathStep::AttributeName(name.to_string())],
        }
    }

    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn attribute(mut self, name: &str) -> Self {
        self.steps
            .push(AttributePathStep::AttributeName(name.to_string()));
        self
    }

    pub fn index(mut self, idx: i64) -> Self {
        self.steps.push(AttributePathStep::ElementKeyInt(idx));
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.steps
            .push(AttributePathStep::ElementKeyString(key.to_string()));
        self
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                AttributePathStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                AttributePathStep::AttributeName(name) => write!(f, ".{}", name)?,
                AttributePathStep::ElementKeyString(key) => write!(f, "[{:?}]", key)?,
                AttributePathStep::ElementKeyInt(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributePathStep {
    AttributeName(String),
    ElementKeyString(String),
    ElementKeyInt(i64),
}

/// Diagnostic is a warning or error reported back to Terraform
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, path: AttributePath) -> Self {
        self.attribute = Some(path);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// True when any diagnostic in the slice is an error
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Config represents configuration values
pub type Config = DynamicValue;

/// State represents resource state values
pub type State = DynamicValue;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_value_string_access() {
        let mut dv = DynamicValue::object();
        dv.set_string(&AttributePath::new("name"), "telegraf").unwrap();

        assert_eq!(dv.get_string(&AttributePath::new("name")).unwrap(), "telegraf");
    }

    #[test]
    fn dynamic_value_nested_list_access() {
        let mut policy = HashMap::new();
        policy.insert("name".to_string(), Dynamic::from("1week"));
        let mut dv = DynamicValue::object();
        dv.set_list(
            &AttributePath::new("retention_policies"),
            vec![Dynamic::Map(policy)],
        )
        .unwrap();

        let path = AttributePath::new("retention_policies").index(0).attribute("name");
        assert_eq!(dv.get_string(&path).unwrap(), "1week");

        dv.set_string(&path, "2weeks").unwrap();
        assert_eq!(dv.get_string(&path).unwrap(), "2weeks");
    }

    #[test]
    fn type_mismatch_reports_both_types() {
        let mut dv = DynamicValue::object();
        dv.set_bool(&AttributePath::new("admin"), true).unwrap();

        let err = dv.get_string(&AttributePath::new("admin")).unwrap_err();
        assert!(err.to_string().contains("expected string, got bool"));
    }

    #[test]
    fn null_list_reads_as_empty() {
        let mut dv = DynamicValue::object();
        dv.set(&AttributePath::new("grant"), Dynamic::Null).unwrap();

        assert!(dv.get_list(&AttributePath::new("grant")).unwrap().is_empty());
    }

    #[test]
    fn msgpack_round_trip_preserves_object() {
        let mut dv = DynamicValue::object();
        dv.set_string(&AttributePath::new("name"), "db").unwrap();
        dv.set_number(&AttributePath::new("replication"), 3.0).unwrap();
        dv.set(&AttributePath::new("id"), Dynamic::Null).unwrap();

        let bytes = dv.encode_msgpack().unwrap();
        let decoded = DynamicValue::decode_msgpack(&bytes).unwrap();

        assert_eq!(decoded, dv);
    }

    #[test]
    fn unknown_encodes_as_terraform_extension() {
        let bytes = DynamicValue::new(Dynamic::Unknown).encode_msgpack().unwrap();
        assert_eq!(bytes, vec![0xd4, 0x00, 0x00]);
    }

    #[test]
    fn json_state_decodes_numbers_and_nulls() {
        let dv = DynamicValue::decode_json(br#"{"name":"db","replication":1,"id":null}"#).unwrap();

        assert_eq!(dv.get_number(&AttributePath::new("replication")).unwrap(), 1.0);
        assert!(dv.get(&AttributePath::new("id")).unwrap().is_null());
    }

    #[test]
    fn path_display_is_terraform_like() {
        let path = AttributePath::new("grant").index(2).attribute("privilege");
        assert_eq!(path.to_string(), "grant[2].privilege");
    }
}
