//! On-disk text representation of task records.
//!
//! A record is a delimited `key: value` header followed by a verbatim body:
//!
//! ```text
//! ---
//! id: 20260114T093000000Z-1a2b3c4d
//! kind: mail
//! priority: high
//! created_at: 2026-01-14T09:30:00.000Z
//! last_transitioned_at: 2026-01-14T09:30:00.000Z
//! action.name: reply
//! ---
//! invoice overdue
//! ```
//!
//! Decoding is strict: any deviation from the grammar is an error, never a
//! partial read. Priority is the one lenient field.

use crate::task::domain::{
    ActionDescriptor, PersistedTaskData, Priority, TaskDomainError, TaskId, TaskKind, TaskRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::ops::Range;
use thiserror::Error;

const DELIMITER: &str = "---";
const ACTION_PREFIX: &str = "action.";

const ID: &str = "id";
const KIND: &str = "kind";
const PRIORITY: &str = "priority";
const CREATED_AT: &str = "created_at";
const LAST_TRANSITIONED_AT: &str = "last_transitioned_at";
const EXPIRES_AT: &str = "expires_at";

const KNOWN_KEYS: [&str; 6] = [ID, KIND, PRIORITY, CREATED_AT, LAST_TRANSITIONED_AT, EXPIRES_AT];

/// Errors returned while decoding a stored record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordCodecError {
    /// The first line is not the header delimiter.
    #[error("record does not start with '---'")]
    MissingOpeningDelimiter,

    /// The header is never closed.
    #[error("record header is not closed with '---'")]
    MissingClosingDelimiter,

    /// A header line is not of the form `key: value`.
    #[error("malformed header line {line_number}")]
    MalformedLine {
        /// One-based line number within the record.
        line_number: usize,
    },

    /// A header key is not part of the grammar.
    #[error("unknown header key '{0}'")]
    UnknownKey(String),

    /// A header key appears more than once.
    #[error("duplicate header key '{0}'")]
    DuplicateKey(String),

    /// A required header key is absent.
    #[error("missing required header key '{0}'")]
    MissingField(&'static str),

    /// A timestamp is not RFC 3339.
    #[error("invalid timestamp for '{field}': {value}")]
    InvalidTimestamp {
        /// Header key holding the timestamp.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// `last_transitioned_at` precedes `created_at`.
    #[error("last_transitioned_at precedes created_at")]
    TimestampOrder,

    /// A header value violates a domain constraint.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
}

/// Renders a record in its on-disk form.
///
/// The state is not written: it is implied by the partition that holds the
/// file.
#[must_use]
pub fn encode(record: &TaskRecord) -> String {
    let mut out = String::with_capacity(256 + record.body().len());
    out.push_str(DELIMITER);
    out.push('\n');
    push_field(&mut out, ID, record.id().as_str());
    push_field(&mut out, KIND, record.kind().as_str());
    push_field(&mut out, PRIORITY, record.priority().as_str());
    push_field(&mut out, CREATED_AT, &format_timestamp(record.created_at()));
    push_field(
        &mut out,
        LAST_TRANSITIONED_AT,
        &format_timestamp(record.last_transitioned_at()),
    );
    if let Some(expires_at) = record.expires_at() {
        push_field(&mut out, EXPIRES_AT, &format_timestamp(expires_at));
    }
    if let Some(descriptor) = record.action_descriptor() {
        for (key, value) in descriptor.iter() {
            push_field(&mut out, &format!("{ACTION_PREFIX}{key}"), value);
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(record.body());
    out
}

/// Parses the on-disk form of a record.
///
/// # Errors
///
/// Returns a [`RecordCodecError`] describing the first grammar violation.
pub fn decode(text: &str) -> Result<PersistedTaskData, RecordCodecError> {
    let mut header = RawHeader::default();
    let mut consumed = 0;
    let mut opened = false;
    let mut closed = false;

    for (index, raw_line) in text.split_inclusive('\n').enumerate() {
        consumed += raw_line.len();
        let line = raw_line
            .strip_suffix('\n')
            .map_or(raw_line, |rest| rest.strip_suffix('\r').unwrap_or(rest));
        if index == 0 {
            if line != DELIMITER {
                return Err(RecordCodecError::MissingOpeningDelimiter);
            }
            opened = true;
            continue;
        }
        if line == DELIMITER {
            closed = true;
            break;
        }
        header.insert(index + 1, line)?;
    }

    if !opened {
        return Err(RecordCodecError::MissingOpeningDelimiter);
    }
    if !closed {
        return Err(RecordCodecError::MissingClosingDelimiter);
    }

    let body = text.get(consumed..).unwrap_or_default().to_owned();
    header.into_data(body)
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// Formats a header timestamp: RFC 3339 UTC with millisecond precision.
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Locates the `last_transitioned_at` value within an encoded record.
///
/// Returns the byte range of the trimmed value, or `None` when the header
/// has no such line.
#[must_use]
pub fn transition_stamp_span(text: &str) -> Option<Range<usize>> {
    let mut offset = 0;
    for (index, raw_line) in text.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end();
        if index == 0 {
            continue;
        }
        if line == DELIMITER {
            return None;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() != LAST_TRANSITIONED_AT {
            continue;
        }
        let leading = value.len() - value.trim_start().len();
        let value_start = line_start + key.len() + 1 + leading;
        return Some(value_start..line_start + line.len());
    }
    None
}

#[derive(Debug, Default)]
struct RawHeader<'a> {
    fields: BTreeMap<&'a str, &'a str>,
    action: BTreeMap<&'a str, &'a str>,
}

impl<'a> RawHeader<'a> {
    fn insert(&mut self, line_number: usize, line: &'a str) -> Result<(), RecordCodecError> {
        let (raw_key, raw_value) = line
            .split_once(':')
            .ok_or(RecordCodecError::MalformedLine { line_number })?;
        let key = raw_key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(RecordCodecError::MalformedLine { line_number });
        }
        let value = raw_value.trim();

        let previous = if let Some(action_key) = key.strip_prefix(ACTION_PREFIX) {
            self.action.insert(action_key, value)
        } else if KNOWN_KEYS.contains(&key) {
            self.fields.insert(key, value)
        } else {
            return Err(RecordCodecError::UnknownKey(key.to_owned()));
        };
        if previous.is_some() {
            return Err(RecordCodecError::DuplicateKey(key.to_owned()));
        }
        Ok(())
    }

    fn required(&self, key: &'static str) -> Result<&'a str, RecordCodecError> {
        self.fields
            .get(key)
            .copied()
            .ok_or(RecordCodecError::MissingField(key))
    }

    fn timestamp(&self, key: &'static str) -> Result<DateTime<Utc>, RecordCodecError> {
        parse_timestamp(key, self.required(key)?)
    }

    fn into_data(self, body: String) -> Result<PersistedTaskData, RecordCodecError> {
        let id = TaskId::parse(self.required(ID)?)?;
        let kind = TaskKind::new(self.required(KIND)?)?;
        let priority = Priority::parse_lenient(self.fields.get(PRIORITY).copied());
        let created_at = self.timestamp(CREATED_AT)?;
        let last_transitioned_at = self.timestamp(LAST_TRANSITIONED_AT)?;
        if last_transitioned_at < created_at {
            return Err(RecordCodecError::TimestampOrder);
        }
        let expires_at = self
            .fields
            .get(EXPIRES_AT)
            .map(|value| parse_timestamp(EXPIRES_AT, value))
            .transpose()?;

        let action_descriptor = if self.action.is_empty() {
            None
        } else {
            let descriptor = self
                .action
                .into_iter()
                .try_fold(ActionDescriptor::default(), |descriptor, (key, value)| {
                    descriptor.with(key, value)
                })?;
            Some(descriptor)
        };

        Ok(PersistedTaskData {
            id,
            kind,
            priority,
            created_at,
            last_transitioned_at,
            expires_at,
            action_descriptor,
            body,
        })
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, RecordCodecError> {
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|_| RecordCodecError::InvalidTimestamp {
            field,
            value: value.to_owned(),
        })
}
