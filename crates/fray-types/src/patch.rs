use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field of an update record with three distinguishable states:
/// `None` = absent from the record (unchanged), `Some(None)` = present as
/// JSON null (cleared), `Some(Some(v))` = present with a value (set).
///
/// Serializers collapse the outer `Option` by default, so every `Patch`
/// field must carry `#[serde(default, skip_serializing_if = "Option::is_none",
/// with = "patch")]` to keep the absent/null distinction on the wire.
pub type Patch<T> = Option<Option<T>>;

pub mod patch {
    use super::*;

    pub fn serialize<T, S>(value: &Patch<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            // Unreachable under skip_serializing_if, kept total for safety
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Patch<T>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Update {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
        body: Patch<String>,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "patch")]
        reason: Patch<String>,
    }

    #[test]
    fn test_absent_field_stays_absent() {
        let update = Update {
            id: "msg-1".to_string(),
            body: Some(Some("hi".to_string())),
            reason: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("reason"));

        let back: Update = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reason, None);
        assert_eq!(back.body, Some(Some("hi".to_string())));
    }

    #[test]
    fn test_null_field_means_cleared() {
        let json = r#"{"id":"msg-1","body":null}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.body, Some(None));
        assert_eq!(update.reason, None);

        let out = serde_json::to_string(&update).unwrap();
        assert!(out.contains(r#""body":null"#));
        assert!(!out.contains("reason"));
    }

    #[test]
    fn test_set_field_round_trips() {
        let json = r#"{"id":"msg-1","body":"edited","reason":"typo"}"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.body, Some(Some("edited".to_string())));
        assert_eq!(update.reason, Some(Some("typo".to_string())));
    }
}
