//! Serialize u64 identifiers as strings so JSON consumers that truncate
//! large integers (browser tooling, spreadsheet exports) keep them intact.
//! Deserialization accepts either form.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Numeric(u64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(raw) => raw.parse::<u64>().map_err(D::Error::custom),
        RawId::Numeric(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
    struct Tagged {
        #[serde(with = "super")]
        item: u64,
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Tagged {
            item: 9_223_372_036_854_775_900,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"item":"9223372036854775900"}"#);
    }

    #[test]
    fn accepts_string_and_numeric_input() {
        let from_text: Tagged = serde_json::from_str(r#"{"item":"42"}"#).expect("text id");
        let from_number: Tagged = serde_json::from_str(r#"{"item":42}"#).expect("numeric id");
        assert_eq!(from_text, from_number);
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(serde_json::from_str::<Tagged>(r#"{"item":"forge"}"#).is_err());
    }
}
