use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// A JSON array stored in a TEXT column.
///
/// Decoding is lenient: anything that is not a JSON array, or a string
/// holding one, loads as an empty list. The same rule applies to column text
/// and to request or upstream payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonList(pub Vec<Value>);

impl JsonList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn encode(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self(items),
            Value::String(raw) => Self::from(raw),
            _ => Self::default(),
        }
    }
}

impl From<String> for JsonList {
    fn from(raw: String) -> Self {
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(Value::Array(items)) => Self(items),
            _ => Self::default(),
        }
    }
}

impl From<JsonList> for String {
    fn from(list: JsonList) -> Self {
        list.encode()
    }
}

impl From<Vec<Value>> for JsonList {
    fn from(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl Serialize for JsonList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

/// Opaque JSON document stored in a nullable TEXT column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonBlob(pub Option<Value>);

impl From<Option<String>> for JsonBlob {
    fn from(raw: Option<String>) -> Self {
        Self(raw.and_then(|text| serde_json::from_str(&text).ok()))
    }
}

impl From<JsonBlob> for Option<String> {
    fn from(blob: JsonBlob) -> Self {
        blob.0.map(|value| value.to_string())
    }
}

impl Serialize for JsonBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_text_decodes_arrays_only() {
        let list = JsonList::from(r#"["https://a.example/ata.pdf"]"#.to_string());
        assert_eq!(list.len(), 1);

        assert!(JsonList::from("not json".to_string()).is_empty());
        assert!(JsonList::from("{\"a\":1}".to_string()).is_empty());
        assert!(JsonList::from(String::new()).is_empty());
    }

    #[test]
    fn payload_accepts_encoded_string() {
        let list: JsonList = serde_json::from_value(json!("[\"foto\", \"ata\"]")).unwrap();
        assert_eq!(list.0, vec![json!("foto"), json!("ata")]);

        let list: JsonList = serde_json::from_value(json!(null)).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn payload_without_array_decodes_empty() {
        for value in [json!("nao e json"), json!("  "), json!({"url": "x"}), json!(3)] {
            let list: JsonList = serde_json::from_value(value.clone()).unwrap();
            assert!(list.is_empty(), "{value} should decode empty");

            let stored: String = list.into();
            assert_eq!(stored, "[]");
            assert!(JsonList::from(stored).is_empty());
        }
    }

    #[test]
    fn encodes_back_to_array_text() {
        let list = JsonList(vec![json!({"titulo": "Plano"})]);
        let text: String = list.into();
        assert_eq!(text, r#"[{"titulo":"Plano"}]"#);
    }

    #[test]
    fn blob_ignores_invalid_text() {
        assert_eq!(JsonBlob::from(Some("{oops".to_string())), JsonBlob(None));
        assert_eq!(
            JsonBlob::from(Some("{\"nome\":\"Fortaleza\"}".to_string())),
            JsonBlob(Some(json!({"nome": "Fortaleza"})))
        );
    }

    #[test]
    fn classifies_nullable_fields() {
        let body = json!({"link_formulario": null, "categoria": "Saúde"});
        assert!(matches!(
            classify_nullable(body.get("link_formulario")),
            Ok(NullableValue::Null)
        ));
        assert!(matches!(
            classify_nullable(body.get("missing")),
            Ok(NullableValue::Omitted)
        ));
        assert!(classify_nullable(Some(&json!(3))).is_err());
    }
}
