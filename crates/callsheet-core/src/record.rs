use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::datetime::parse_timestamp;

/// One customer row returned by `GET /customers/reminders`.
///
/// Fields the reminder flow does not read are kept in `extra` so the
/// whole record can travel to the edit view untouched. That includes the
/// numeric database `id`, which sits next to `C_unique_id` on real rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScheduledCallRecord {
    #[serde(
        rename = "C_unique_id",
        default,
        deserialize_with = "deserialize_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub identifier: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pub phone_no: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduledCallRecord {
    pub fn scheduled_time(&self, tz: &Tz) -> Option<DateTime<Utc>> {
        self.scheduled_at
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, tz))
    }

    /// First and last name joined, skipping blank parts.
    pub fn display_name(&self) -> String {
        join_name_parts([self.first_name.as_deref(), self.last_name.as_deref()])
    }

    pub fn full_name(&self) -> String {
        join_name_parts([
            self.first_name.as_deref(),
            self.middle_name.as_deref(),
            self.last_name.as_deref(),
        ])
    }
}

fn join_name_parts<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// Backends disagree on whether ids and phone numbers are strings or numbers.
fn scalar_to_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(scalar_to_string(Option::<Value>::deserialize(
        deserializer,
    )?))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_backend_row_and_keeps_extra_fields() {
        let record: ScheduledCallRecord = serde_json::from_value(json!({
            "C_unique_id": 42,
            "first_name": "Asha",
            "middle_name": "K",
            "last_name": "Rao",
            "phone_no": 9876543210u64,
            "scheduled_at": "2025-01-15T12:00:30.000Z",
            "loan_amount": "15000",
        }))
        .expect("decode record");

        assert_eq!(record.identifier.as_deref(), Some("42"));
        assert_eq!(record.phone_no.as_deref(), Some("9876543210"));
        assert_eq!(record.display_name(), "Asha Rao");
        assert_eq!(record.full_name(), "Asha K Rao");
        assert_eq!(record.extra.get("loan_amount"), Some(&json!("15000")));
    }

    #[test]
    fn database_id_and_unique_id_coexist() {
        let row = json!({
            "id": 17,
            "C_unique_id": "FF_017",
            "first_name": "Asha",
            "last_name": "Rao",
            "phone_no": "9876543210",
            "scheduled_at": "2025-01-15T12:00:30Z",
        });

        let record: ScheduledCallRecord =
            serde_json::from_value(row).expect("decode row with both ids");

        assert_eq!(record.identifier.as_deref(), Some("FF_017"));
        assert_eq!(record.extra.get("id"), Some(&json!(17)));

        let back = serde_json::to_value(&record).expect("encode record");
        assert_eq!(back["id"], json!(17));
        assert_eq!(back["C_unique_id"], json!("FF_017"));
    }

    #[test]
    fn missing_fields_decode_as_none() {
        let record: ScheduledCallRecord =
            serde_json::from_value(json!({ "first_name": "Ravi", "last_name": null }))
                .expect("decode sparse record");

        assert_eq!(record.identifier, None);
        assert_eq!(record.scheduled_at, None);
        assert_eq!(record.display_name(), "Ravi");
        assert_eq!(record.scheduled_time(&chrono_tz::UTC), None);
    }
}
