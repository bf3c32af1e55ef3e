//! Wire types for arrival messages carried on the topic.
//!
//! The producer forwards TAN open-data payloads mostly untouched, so several
//! fields arrive with loose types: `sens` is sometimes an integer, `tempsReel`
//! is usually the string `"true"`, and `timestamp` may be ISO text or epoch
//! seconds. The custom deserializers below normalise those shapes.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One message from the arrivals topic: a stop and its predicted arrivals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalMessage {
    /// Emission timestamp as sent by the producer.
    #[serde(default, deserialize_with = "deserialize_label")]
    pub timestamp: Option<String>,
    pub stop_code: String,
    #[serde(default)]
    pub stop_name: Option<String>,
    pub arrivals: Vec<ArrivalEntry>,
}

/// A single predicted arrival, owned by its parent [`ArrivalMessage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrivalEntry {
    /// Direction label.
    #[serde(default, deserialize_with = "deserialize_label")]
    pub sens: Option<String>,
    #[serde(default)]
    pub terminus: Option<String>,
    /// Free-form wait text ("proche", "5", "12mn", ...).
    #[serde(default)]
    pub temps: Option<String>,
    #[serde(rename = "tempsReel", default, deserialize_with = "deserialize_flag")]
    pub temps_reel: bool,
    #[serde(default)]
    pub ligne: Option<LineRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineRef {
    #[serde(rename = "numLigne", default, deserialize_with = "deserialize_label")]
    pub num_ligne: Option<String>,
}

impl ArrivalEntry {
    /// Line number, if the entry carries one.
    pub fn line(&self) -> Option<&str> {
        self.ligne.as_ref().and_then(|l| l.num_ligne.as_deref())
    }
}

/// Accepts a string, an integer, a float or null and keeps it as text.
fn deserialize_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LabelVisitor;

    impl<'de> Visitor<'de> for LabelVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, a number or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(LabelVisitor)
}

/// Accepts a JSON boolean or its string spelling ("true"/"false"); null is false.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a boolean or \"true\"/\"false\"")
        }

        fn visit_bool<E>(self, value: bool) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_str<E>(self, value: &str) -> Result<bool, E>
        where
            E: de::Error,
        {
            match value.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }

        fn visit_u64<E>(self, value: u64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }

        fn visit_i64<E>(self, value: i64) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(value != 0)
        }

        fn visit_unit<E>(self) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(false)
        }

        fn visit_none<E>(self) -> Result<bool, E>
        where
            E: de::Error,
        {
            Ok(false)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<bool, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}
