use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One decoded `data:` record from a chat-messages event stream.
///
/// Records are discriminated by their `event` field. Discriminators this
/// client does not handle decode to `Unknown` and are skipped by the
/// processor.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamRecord {
    /// Incremental answer fragment.
    Message(MessageEvent),
    /// End of one assistant message, carrying usage accounting.
    MessageEnd(MessageEndEvent),
    /// Backend-reported failure in the middle of a stream.
    Error(ErrorEvent),
    /// Any other discriminator (`ping`, `workflow_started`, ...).
    Unknown,
}

impl StreamRecord {
    /// Routes a decoded payload on its `event` field.
    ///
    /// Returns `None` only when the payload is not an object or has no string
    /// `event`. Other fields are read leniently: a value of an unexpected type
    /// becomes the field's default instead of rejecting the record.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let event = match fields.get("event") {
            Some(Value::String(event)) => event.clone(),
            _ => return None,
        };
        let record = match event.as_str() {
            "message" => Self::Message(from_fields(fields)),
            "message_end" => Self::MessageEnd(from_fields(fields)),
            "error" => {
                fields.remove("event");
                Self::Error(ErrorEvent { fields })
            }
            _ => Self::Unknown,
        };
        Some(record)
    }

    /// Returns the wire discriminator for this record.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::MessageEnd(_) => "message_end",
            Self::Error(_) => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl<'de> Deserialize<'de> for StreamRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).ok_or_else(|| {
            serde::de::Error::custom("expected a JSON object with a string `event` field")
        })
    }
}

fn from_fields<T>(fields: serde_json::Map<String, Value>) -> T
where
    T: DeserializeOwned + Default,
{
    T::deserialize(Value::Object(fields)).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "record fields did not decode; using defaults");
        T::default()
    })
}

/// `message` record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub task_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    /// Raw answer fragment; may still contain `\uXXXX` escapes.
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_variable_selector: Option<serde_json::Value>,
}

/// `message_end` record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEndEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversation_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub task_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, deserialize_with = "lenient")]
    pub files: Option<Vec<StreamFile>>,
}

impl MessageEndEvent {
    /// Message id of the finished answer, preferring `message_id` over `id`.
    pub fn final_message_id(&self) -> &str {
        if self.message_id.is_empty() {
            &self.id
        } else {
            &self.message_id
        }
    }

    /// Usage accounting, when the backend reported any.
    pub fn usage(&self) -> Option<&Usage> {
        self.metadata.as_ref().and_then(|m| m.usage.as_ref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, deserialize_with = "lenient")]
    pub usage: Option<Usage>,
}

/// Token, cost and latency accounting attached to `message_end`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_tokens: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub total_price: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: String,
    /// Seconds.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub latency: f64,
}

/// File attached to a finished message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFile {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
}

/// `error` record. The payload is kept as-is since backends disagree on its
/// shape; `message`, `code` and `status` are the common fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ErrorEvent {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").and_then(|v| v.as_str())
    }

    pub fn code(&self) -> Option<&str> {
        self.fields.get("code").and_then(|v| v.as_str())
    }

    pub fn status(&self) -> Option<u64> {
        self.fields.get("status").and_then(|v| v.as_u64())
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = self.fields.clone();
        fields.insert("event".into(), serde_json::Value::from("error"));
        write!(f, "{}", serde_json::Value::Object(fields))
    }
}

/// Events yielded by [`crate::processor::event_stream`], the pull-based
/// counterpart of the callback API.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    Message(MessageEvent),
    MessageEnd(MessageEndEvent),
}

/// Any JSON value into `T`, or `T::default()` when it does not fit.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Strings as-is, numbers and booleans rendered, anything else empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    Ok(number_of(&value).filter(|n| *n >= 0.0).map_or(0, |n| n as u64))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(number_of(&Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Unix seconds; fractional values are truncated.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_i64() {
        return Ok(Some(n));
    }
    Ok(number_of(&value).map(|n| n as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_tolerates_missing_and_null_fields() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"event":"message","answer":"hi","task_id":null}"#)
                .expect("decode");
        let StreamRecord::Message(event) = record else {
            panic!("expected message, got {record:?}");
        };
        assert_eq!(event.answer, "hi");
        assert_eq!(event.task_id, "");
        assert_eq!(event.created_at, None);
    }

    #[test]
    fn message_end_carries_usage_and_null_files() {
        let record: StreamRecord = serde_json::from_str(
            r#"{"event":"message_end","id":"m-1","conversation_id":"c-1","task_id":"t-1",
                "metadata":{"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8,
                "total_price":"0.0001","currency":"USD","latency":0.42}},"files":null}"#,
        )
        .expect("decode");
        let StreamRecord::MessageEnd(end) = record else {
            panic!("expected message_end, got {record:?}");
        };
        assert_eq!(end.final_message_id(), "m-1");
        let usage = end.usage().expect("usage");
        assert_eq!(usage.total_tokens, 8);
        assert_eq!(usage.currency, "USD");
        assert!(end.files.is_none());
    }

    #[test]
    fn unrecognised_discriminator_decodes_to_unknown() {
        let record: StreamRecord =
            serde_json::from_str(r#"{"event":"ping","whatever":1}"#).expect("decode");
        assert_eq!(record, StreamRecord::Unknown);
    }

    #[test]
    fn error_event_display_includes_payload() {
        let record: StreamRecord = serde_json::from_str(
            r#"{"event":"error","status":400,"code":"invalid_param","message":"bad query"}"#,
        )
        .expect("decode");
        let StreamRecord::Error(err) = record else {
            panic!("expected error record");
        };
        assert_eq!(err.code(), Some("invalid_param"));
        assert_eq!(err.status(), Some(400));
        let rendered = err.to_string();
        assert!(rendered.contains("bad query"));
        assert!(rendered.contains("\"event\":\"error\""));
    }

    fn message(json: &str) -> MessageEvent {
        match serde_json::from_str(json).expect("decode") {
            StreamRecord::Message(event) => event,
            other => panic!("expected message, got {other:?}"),
        }
    }

    fn message_end(json: &str) -> MessageEndEvent {
        match serde_json::from_str(json).expect("decode") {
            StreamRecord::MessageEnd(event) => event,
            other => panic!("expected message_end, got {other:?}"),
        }
    }

    #[test]
    fn fractional_created_at_is_truncated() {
        let event = message(r#"{"event":"message","answer":"a","created_at":1705395332.5}"#);
        assert_eq!(event.answer, "a");
        assert_eq!(event.created_at, Some(1705395332));
    }

    #[test]
    fn numeric_ids_are_rendered_as_strings() {
        let event = message(r#"{"event":"message","answer":"b","id":123,"task_id":true}"#);
        assert_eq!(event.id, "123");
        assert_eq!(event.task_id, "true");
    }

    #[test]
    fn null_usage_counters_default_to_zero() {
        let end = message_end(
            r#"{"event":"message_end","id":"m","metadata":{"usage":{"prompt_tokens":null,"total_tokens":9}}}"#,
        );
        let usage = end.usage().expect("usage");
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.total_tokens, 9);
    }

    #[test]
    fn string_latency_and_counters_are_parsed() {
        let end = message_end(
            r#"{"event":"message_end","metadata":{"usage":{"latency":"0.4","completion_tokens":"12"}}}"#,
        );
        let usage = end.usage().expect("usage");
        assert!((usage.latency - 0.4).abs() < f64::EPSILON);
        assert_eq!(usage.completion_tokens, 12);
    }

    #[test]
    fn malformed_nested_objects_fall_back_to_none() {
        let end = message_end(r#"{"event":"message_end","id":"m","metadata":"oops","files":{"x":1}}"#);
        assert_eq!(end.final_message_id(), "m");
        assert!(end.metadata.is_none());
        assert!(end.files.is_none());
    }

    #[test]
    fn only_objects_with_string_event_are_records() {
        assert!(StreamRecord::from_value(serde_json::json!([1, 2])).is_none());
        assert!(StreamRecord::from_value(serde_json::json!({"answer": "x"})).is_none());
        assert!(StreamRecord::from_value(serde_json::json!({"event": 5})).is_none());
        assert_eq!(
            StreamRecord::from_value(serde_json::json!({"event": "ping"})),
            Some(StreamRecord::Unknown)
        );
    }

    #[test]
    fn error_fields_exclude_the_discriminator() {
        let Some(StreamRecord::Error(err)) = StreamRecord::from_value(
            serde_json::json!({"event": "error", "message": "boom"}),
        ) else {
            panic!("expected error record");
        };
        assert_eq!(err.message(), Some("boom"));
        assert!(!err.fields.contains_key("event"));
    }
}
