//! Diff records and their wire encoding
//!
//! A stored member is the JSON object `{"created": bool, "payload": ...}`.
//! The timestamp travels as the sorted-set score, not inside the member.

use crate::errors::{DecodeError, ExError, ExErrorKind, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One captured change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Captured change; never inspected by the log
    pub payload: Value,
    /// True if this record corresponds to the entity's creation
    pub created: bool,
    /// Milliseconds (with fraction) since the UNIX epoch, UTC
    pub timestamp: f64,
}

#[derive(Serialize)]
struct WireRecord<'a> {
    created: bool,
    payload: &'a Value,
}

impl DiffRecord {
    pub fn new(payload: Value, created: bool, timestamp: f64) -> Self {
        Self {
            payload,
            created,
            timestamp,
        }
    }

    /// Build a record whose payload arrives as JSON text
    pub fn from_json_payload(payload: &str, created: bool, timestamp: f64) -> Result<Self> {
        let payload = serde_json::from_str(payload).map_err(|e| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("from_json_payload")
                .with_message(format!("payload is not valid JSON: {}", e))
        })?;
        Ok(Self::new(payload, created, timestamp))
    }

    /// Encode the record as a store member plus its score
    ///
    /// Object keys serialize in sorted order, so equal payloads always yield
    /// byte-identical members.
    pub fn serialize(&self) -> Result<(Vec<u8>, f64)> {
        let bytes = serde_json::to_vec(&WireRecord {
            created: self.created,
            payload: &self.payload,
        })
        .map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("serialize_record")
                .with_message(e.to_string())
        })?;
        Ok((bytes, self.timestamp))
    }

    /// Decode a store member
    ///
    /// `fallback_timestamp` (the member's score) is used unless the encoding
    /// carries its own numeric `timestamp` field.
    pub fn deserialize(raw: &[u8], fallback_timestamp: f64) -> Result<Self> {
        Ok(decode(raw, fallback_timestamp)?)
    }
}

fn decode(raw: &[u8], fallback_timestamp: f64) -> std::result::Result<DiffRecord, DecodeError> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| DecodeError::InvalidSyntax {
        reason: e.to_string(),
    })?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::InvalidSyntax {
            reason: "record is not an object".to_string(),
        });
    };

    let payload = fields
        .remove("payload")
        .ok_or(DecodeError::MissingField { field: "payload" })?;
    let created = match fields.remove("created") {
        Some(Value::Bool(created)) => created,
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "created",
                reason: format!("expected boolean, got {}", other),
            })
        }
        None => return Err(DecodeError::MissingField { field: "created" }),
    };
    let timestamp = match fields.remove("timestamp") {
        None | Some(Value::Null) => fallback_timestamp,
        Some(Value::Number(n)) => n.as_f64().ok_or(DecodeError::InvalidField {
            field: "timestamp",
            reason: "not representable as f64".to_string(),
        })?,
        Some(other) => {
            return Err(DecodeError::InvalidField {
                field: "timestamp",
                reason: format!("expected number, got {}", other),
            })
        }
    };

    Ok(DiffRecord {
        payload,
        created,
        timestamp,
    })
}

/// UTC timestamp in milliseconds with sub-millisecond fraction
pub fn precise_timestamp(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 * 1000.0 + f64::from(at.timestamp_subsec_micros()) / 1000.0
}

/// `precise_timestamp` for the current instant
pub fn now_timestamp() -> f64 {
    precise_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_serialize_carries_only_payload_and_created() {
        let record = DiffRecord::new(json!({"name": "a"}), true, 1500.25);
        let (bytes, score) = record.serialize().unwrap();

        assert_eq!(score, 1500.25);
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!({"created": true, "payload": {"name": "a"}}));
    }

    #[test]
    fn test_round_trip_uses_score_as_timestamp() {
        let record = DiffRecord::new(json!({"fields": ["name"], "n": 3}), false, 42.5);
        let (bytes, score) = record.serialize().unwrap();

        let decoded = DiffRecord::deserialize(&bytes, score).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_equal_payloads_serialize_identically() {
        let a = DiffRecord::new(json!({"b": 1, "a": 2}), false, 1.0);
        let b = DiffRecord::new(json!({"a": 2, "b": 1}), false, 99.0);
        assert_eq!(a.serialize().unwrap().0, b.serialize().unwrap().0);
    }

    #[test]
    fn test_embedded_timestamp_wins_over_fallback() {
        let raw = br#"{"payload": {}, "created": false, "timestamp": 7.5}"#;
        let decoded = DiffRecord::deserialize(raw, 100.0).unwrap();
        assert_eq!(decoded.timestamp, 7.5);
    }

    #[test]
    fn test_missing_created_is_decode_error() {
        let err = DiffRecord::deserialize(br#"{"payload": {}}"#, 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Decode);
        assert!(err.message().contains("created"));
    }

    #[test]
    fn test_invalid_syntax_is_decode_error() {
        let err = DiffRecord::deserialize(b"not json", 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Decode);

        let err = DiffRecord::deserialize(b"[1, 2]", 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Decode);
    }

    #[test]
    fn test_non_boolean_created_is_decode_error() {
        let err = DiffRecord::deserialize(br#"{"payload": 1, "created": "yes"}"#, 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Decode);
    }

    #[test]
    fn test_payload_from_json_text() {
        let record = DiffRecord::from_json_payload(r#"{"test": "data"}"#, false, 1.0).unwrap();
        assert_eq!(record.payload, json!({"test": "data"}));

        let err = DiffRecord::from_json_payload("{oops", false, 1.0).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_precise_timestamp_keeps_fraction() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        assert!((precise_timestamp(at) - 1_700_000_000_123.456).abs() < 1e-3);
    }
}
