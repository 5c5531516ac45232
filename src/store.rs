//! Line-oriented text encoding for embedding records.
//!
//! Each line is `id,[v0, v1, ...]` with no header. The vector field is read
//! back with a small fixed grammar (bracket, comma-separated floats, bracket),
//! so nothing in a stored file is ever evaluated.

use crate::config::Number;
use crate::error::{Error, Result};
use crate::record::{Dataset, DocumentRecord};
use std::fmt::Write;

const FIELD_SEPARATOR: char = ',';

/// Encodes one record as a store line (without trailing newline).
pub fn serialize(id: &str, vector: &[Number]) -> Result<String> {
    validate_id(id)?;

    let mut line = String::with_capacity(id.len() + vector.len() * 22 + 3);
    line.push_str(id);
    line.push(FIELD_SEPARATOR);
    line.push('[');
    for (index, value) in vector.iter().enumerate() {
        if !value.is_finite() {
            return Err(Error::NonFiniteValue {
                id: id.to_string(),
                index,
            });
        }
        if index > 0 {
            line.push_str(", ");
        }
        // Debug formatting is the shortest text that parses back to the same
        // bits, and always keeps a decimal point or exponent.
        let _ = write!(line, "{:?}", value);
    }
    line.push(']');
    Ok(line)
}

pub fn serialize_record(record: &DocumentRecord) -> Result<String> {
    serialize(&record.id, &record.vector)
}

/// Encodes a whole dataset, one line per record, joined by `\n`.
pub fn serialize_dataset(dataset: &Dataset) -> Result<String> {
    let lines = dataset
        .records()
        .iter()
        .map(serialize_record)
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

/// Parses store lines into a validated dataset.
///
/// Blank lines are skipped. Any malformed line aborts the whole parse; the
/// resulting records then go through [`Dataset::new`], so unequal dimensions
/// and repeated ids are reported as their own errors.
pub fn deserialize<I>(lines: I) -> Result<Dataset>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut records = Vec::new();
    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_line(line, index + 1)?);
    }
    Dataset::new(records)
}

/// Convenience wrapper over [`deserialize`] for a whole file's contents.
pub fn deserialize_str(text: &str) -> Result<Dataset> {
    deserialize(text.lines())
}

/// Parses a single store line; `line_number` is 1-based and only used for
/// error messages.
pub fn parse_line(line: &str, line_number: usize) -> Result<DocumentRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (id, vector_field) = line.split_once(FIELD_SEPARATOR).ok_or_else(|| {
        Error::parse(line_number, "expected 2 fields (id, vector), found 1")
    })?;

    if id.is_empty() {
        return Err(Error::parse(line_number, "empty id"));
    }
    if id.contains('"') {
        return Err(Error::parse(line_number, "quoted ids are not supported"));
    }

    let vector = parse_vector(vector_field, line_number)?;
    Ok(DocumentRecord::new(id, vector))
}

fn parse_vector(field: &str, line_number: usize) -> Result<Vec<Number>> {
    let mut field = field.trim();

    // pandas-style CSV writers quote the list because it contains commas.
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        field = field[1..field.len() - 1].trim();
    }

    let inner = field
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            Error::parse(
                line_number,
                format!(
                    "expected exactly 2 fields with a bracketed vector, got '{}'",
                    preview(field)
                ),
            )
        })?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(FIELD_SEPARATOR)
        .enumerate()
        .map(|(index, token)| {
            let token = token.trim();
            if token.is_empty() {
                return Err(Error::parse(
                    line_number,
                    format!("missing element at index {}", index),
                ));
            }
            let value: Number = token.parse().map_err(|_| {
                Error::parse(
                    line_number,
                    format!("element {} is not a number: '{}'", index, preview(token)),
                )
            })?;
            if !value.is_finite() {
                return Err(Error::parse(
                    line_number,
                    format!("element {} is not finite: '{}'", index, token),
                ));
            }
            Ok(value)
        })
        .collect()
}

fn validate_id(id: &str) -> Result<()> {
    let reason = if id.is_empty() {
        "id is empty"
    } else if id.contains(FIELD_SEPARATOR) {
        "id contains the field separator ','"
    } else if id.contains('"') {
        "id contains a double quote"
    } else if id.contains(['\n', '\r']) {
        "id contains a line break"
    } else {
        return Ok(());
    };
    Err(Error::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    })
}

fn preview(text: &str) -> String {
    const MAX: usize = 40;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
