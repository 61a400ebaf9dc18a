//! Opaque per-line adjustments ("extra shot", "no sugar", ...).
//!
//! The engine never interprets these; it only stores and returns them. Keys keep
//! their insertion order through serialization.

use core::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

/// A single adjustment value.
///
/// Numbers keep the representation they arrived with: `2` stays an integer
/// and `2.0` stays a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdjustmentValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
}

impl From<bool> for AdjustmentValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AdjustmentValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for AdjustmentValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// NaN and infinities have no JSON form and become `Null`.
impl From<f64> for AdjustmentValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for AdjustmentValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AdjustmentValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Order-preserving string-keyed bag of adjustment values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjustments {
    entries: Vec<(String, AdjustmentValue)>,
}

impl Adjustments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AdjustmentValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AdjustmentValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&AdjustmentValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AdjustmentValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Adjustments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct AdjustmentsVisitor;

impl<'de> Visitor<'de> for AdjustmentsVisitor {
    type Value = Adjustments;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of adjustment values (or null)")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut out = Adjustments::new();
        while let Some((k, v)) = access.next_entry::<String, AdjustmentValue>()? {
            out.insert(k, v);
        }
        Ok(out)
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Adjustments::new())
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(Adjustments::new())
    }
}

impl<'de> Deserialize<'de> for Adjustments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AdjustmentsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_insertion_order_through_json() {
        let adj = Adjustments::new()
            .with("size", "large")
            .with("extra_shot", true)
            .with("milk_ml", 120.0)
            .with("syrup", AdjustmentValue::Null);

        let json = serde_json::to_string(&adj).unwrap();
        assert_eq!(
            json,
            r#"{"size":"large","extra_shot":true,"milk_ml":120.0,"syrup":null}"#
        );

        let back: Adjustments = serde_json::from_str(&json).unwrap();
        let keys: Vec<&str> = back.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["size", "extra_shot", "milk_ml", "syrup"]);
        assert_eq!(back, adj);
    }

    #[test]
    fn replacing_a_key_keeps_its_position() {
        let mut adj = Adjustments::new().with("a", 1i64).with("b", 2i64);
        adj.insert("a", "changed");
        let keys: Vec<&str> = adj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(adj.get("a"), Some(&AdjustmentValue::Text("changed".into())));
    }

    #[test]
    fn integers_and_floats_pass_through_unchanged() {
        let json = r#"{"shots":2,"sweetness":0.5,"temp":-3,"ratio":2.0}"#;
        let adj: Adjustments = serde_json::from_str(json).unwrap();
        assert_eq!(adj.get("shots"), Some(&AdjustmentValue::from(2i64)));
        assert_eq!(serde_json::to_string(&adj).unwrap(), json);
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(AdjustmentValue::from(f64::NAN), AdjustmentValue::Null);
    }

    #[test]
    fn null_deserializes_to_empty_bag() {
        let adj: Adjustments = serde_json::from_str("null").unwrap();
        assert!(adj.is_empty());
    }
}
