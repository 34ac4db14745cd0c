//! Vote records and their schema-on-read projection.
//!
//! A source line is deserialised into [`RawVote`], which keeps only the six
//! known fields (anything else in the object is ignored), then projected
//! into a [`VoteRecord`] by checking required fields and coercing types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;

use crate::error::RecordError;

/// Storage format for `CreationDate`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// ─── Types ───────────────────────────────────────────────────────────────────

/// A validated vote row, shaped like [`VOTE_COLUMNS`](crate::schema::VOTE_COLUMNS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRecord {
  pub id:            String,
  pub post_id:       String,
  pub vote_type_id:  String,
  pub creation_date: NaiveDateTime,
  pub user_id:       Option<String>,
  pub bounty_amount: Option<String>,
}

impl VoteRecord {
  pub fn creation_date_text(&self) -> String {
    self.creation_date.format(TIMESTAMP_FORMAT).to_string()
  }
}

/// The known fields of a source record, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawVote {
  #[serde(rename = "Id")]
  pub id:            Option<Value>,
  #[serde(rename = "PostId")]
  pub post_id:       Option<Value>,
  #[serde(rename = "VoteTypeId")]
  pub vote_type_id:  Option<Value>,
  #[serde(rename = "CreationDate")]
  pub creation_date: Option<Value>,
  #[serde(rename = "UserId")]
  pub user_id:       Option<Value>,
  #[serde(rename = "BountyAmount")]
  pub bounty_amount: Option<Value>,
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Parse and validate one line of newline-delimited JSON.
pub fn parse_line(line: &str) -> Result<VoteRecord, RecordError> {
  let value: Value = serde_json::from_str(line)
    .map_err(|e| RecordError::Malformed(e.to_string()))?;
  if !value.is_object() {
    return Err(RecordError::Malformed(format!(
      "expected a JSON object, found {}",
      json_type(&value)
    )));
  }
  let raw: RawVote = serde_json::from_value(value)
    .map_err(|e| RecordError::Malformed(e.to_string()))?;
  project(raw)
}

/// Project a raw record onto the vote schema.
pub fn project(raw: RawVote) -> Result<VoteRecord, RecordError> {
  Ok(VoteRecord {
    id:            required_text("Id", raw.id)?,
    post_id:       required_text("PostId", raw.post_id)?,
    vote_type_id:  required_text("VoteTypeId", raw.vote_type_id)?,
    creation_date: required_timestamp("CreationDate", raw.creation_date)?,
    user_id:       optional_text("UserId", raw.user_id)?,
    bounty_amount: optional_text("BountyAmount", raw.bounty_amount)?,
  })
}

fn required_text(field: &'static str, value: Option<Value>) -> Result<String, RecordError> {
  optional_text(field, value)?.ok_or(RecordError::Missing(field))
}

fn optional_text(
  field: &'static str,
  value: Option<Value>,
) -> Result<Option<String>, RecordError> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => Ok(Some(s)),
    // Numbers keep their source text (serde_json `arbitrary_precision`).
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(RecordError::WrongType { field, found: json_type(&other) }),
  }
}

fn required_timestamp(
  field: &'static str,
  value: Option<Value>,
) -> Result<NaiveDateTime, RecordError> {
  match value {
    None | Some(Value::Null) => Err(RecordError::Missing(field)),
    Some(Value::String(s)) => parse_timestamp(&s)
      .ok_or(RecordError::InvalidTimestamp { field, value: s }),
    Some(other) => Err(RecordError::WrongType { field, found: json_type(&other) }),
  }
}

/// Accepts RFC 3339 (normalised to UTC), naive date-times with `T` or space
/// separators and optional fractional seconds, and bare dates.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.naive_utc());
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .or_else(|| {
      NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
    })
}

fn json_type(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
