//! Typed decoder for `FT.SEARCH` replies.
//!
//! A RESP2 search reply is a flat array:
//!
//! ```text
//! [total, key_1, [name, value, name, value, ...], key_2, [...], ...]
//! ```
//!
//! Fields are looked up by name inside each block, never by position. Any
//! deviation from the repeating shape fails closed with `GhostError::Parse`.

use redis::Value;
use tracing::debug;

use ghost_core::error::GhostError;
use ghost_core::types::Candidate;

/// Field names to extract from each result block.
#[derive(Debug, Clone)]
pub struct ResponseFields {
    pub text_field: String,
    pub score_field: String,
    /// Distance used when a block carries no score field.
    pub missing_distance: f64,
}

impl ResponseFields {
    pub fn new(text_field: impl Into<String>, score_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
            score_field: score_field.into(),
            missing_distance: 1.0,
        }
    }

    pub fn with_missing_distance(mut self, distance: f64) -> Self {
        self.missing_distance = distance;
        self
    }
}

/// Decode a search reply into candidates, in reply order.
pub fn parse_search_response(
    reply: &Value,
    fields: &ResponseFields,
) -> Result<Vec<Candidate>, GhostError> {
    let items = match reply {
        Value::Array(items) => items,
        other => {
            return Err(GhostError::Parse(format!(
                "expected array reply, got {}",
                value_kind(other)
            )))
        }
    };

    let (total, entries) = match items.split_first() {
        Some((Value::Int(total), rest)) => (*total, rest),
        Some((other, _)) => {
            return Err(GhostError::Parse(format!(
                "expected result count, got {}",
                value_kind(other)
            )))
        }
        None => return Err(GhostError::Parse("empty reply".to_string())),
    };

    if entries.len() % 2 != 0 {
        return Err(GhostError::Parse(format!(
            "expected key/fields pairs, got {} trailing elements",
            entries.len()
        )));
    }

    let mut candidates = Vec::with_capacity(entries.len() / 2);
    for pair in entries.chunks_exact(2) {
        let key = as_text(&pair[0])
            .ok_or_else(|| GhostError::Parse(format!("document key is {}", value_kind(&pair[0]))))?;
        if let Some(candidate) = parse_entry(&key, &pair[1], fields)? {
            candidates.push(candidate);
        }
    }

    debug!(total, decoded = candidates.len(), "Decoded search reply");
    Ok(candidates)
}

fn parse_entry(
    key: &str,
    block: &Value,
    fields: &ResponseFields,
) -> Result<Option<Candidate>, GhostError> {
    let values = match block {
        Value::Array(values) => values,
        other => {
            return Err(GhostError::Parse(format!(
                "fields of {} are {}",
                key,
                value_kind(other)
            )))
        }
    };
    if values.len() % 2 != 0 {
        return Err(GhostError::Parse(format!(
            "fields of {} have odd length {}",
            key,
            values.len()
        )));
    }

    let mut text = None;
    let mut distance = None;
    for pair in values.chunks_exact(2) {
        let name = as_text(&pair[0]).ok_or_else(|| {
            GhostError::Parse(format!("field name in {} is {}", key, value_kind(&pair[0])))
        })?;
        if name == fields.text_field {
            text = Some(as_text(&pair[1]).ok_or_else(|| {
                GhostError::Parse(format!("text of {} is {}", key, value_kind(&pair[1])))
            })?);
        } else if name == fields.score_field {
            distance = Some(parse_distance(key, &pair[1])?);
        }
    }

    let Some(text) = text else {
        debug!(key, "Dropping search hit without text");
        return Ok(None);
    };

    Ok(Some(Candidate {
        text,
        distance: distance.unwrap_or(fields.missing_distance),
    }))
}

fn parse_distance(key: &str, value: &Value) -> Result<f64, GhostError> {
    let distance = match value {
        Value::Double(d) => *d,
        Value::Int(i) => *i as f64,
        other => {
            let raw = as_text(other).ok_or_else(|| {
                GhostError::Parse(format!("distance of {} is {}", key, value_kind(other)))
            })?;
            raw.trim().parse::<f64>().map_err(|e| {
                GhostError::Parse(format!("distance of {} ({:?}): {}", key, raw, e))
            })?
        }
    };

    if !distance.is_finite() {
        return Err(GhostError::Parse(format!(
            "distance of {} is not finite",
            key
        )));
    }
    Ok(distance)
}

/// UTF-8 text of a string-like value.
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        Value::VerbatimString { text, .. } => Some(text.clone()),
        _ => None,
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Int(_) => "an integer",
        Value::BulkString(_) | Value::SimpleString(_) | Value::VerbatimString { .. } => "a string",
        Value::Array(_) => "an array",
        Value::Map(_) => "a map",
        Value::Double(_) => "a double",
        Value::Okay => "OK",
        _ => "an unsupported value",
    }
}
