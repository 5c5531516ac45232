use crate::config::Number;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{self, Write};

/// One document's embedding, keyed by its path-like id.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub vector: Vec<Number>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, vector: Vec<Number>) -> Self {
        Self {
            id: id.into(),
            vector,
        }
    }
}

/// An ordered batch of records sharing one embedding dimension.
///
/// Row order is preserved end to end: the reducer's output is matched back to
/// ids purely by position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    records: Vec<DocumentRecord>,
    dimensions: usize,
}

impl Dataset {
    /// Validates and wraps `records`.
    ///
    /// The first record fixes the dimension; every later record must match it
    /// exactly. Ids must be unique and vectors non-empty.
    pub fn new(records: Vec<DocumentRecord>) -> Result<Self> {
        let dimensions = records.first().map_or(0, |r| r.vector.len());
        let mut seen = HashSet::with_capacity(records.len());

        for record in &records {
            if record.vector.is_empty() {
                return Err(Error::EmptyVector(record.id.clone()));
            }
            if record.vector.len() != dimensions {
                return Err(Error::DimensionMismatch {
                    id: record.id.clone(),
                    expected: dimensions,
                    found: record.vector.len(),
                });
            }
            if !seen.insert(record.id.as_str()) {
                return Err(Error::DuplicateId(record.id.clone()));
            }
        }

        Ok(Self {
            records,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding dimension, or 0 for an empty dataset.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[Number]> {
        self.records.iter().map(|r| r.vector.as_slice())
    }
}

/// Scaled 2-D position for one document.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodePosition {
    pub id: String,
    pub x: Number,
    pub y: Number,
}

/// Output document consumed by the graph view.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub node_positions: Vec<NodePosition>,
}

impl Layout {
    /// Writes pretty-printed JSON with four-space indentation.
    pub fn write_json_pretty<W: Write>(&self, writer: W) -> Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = Vec::new();
        self.write_json_pretty(&mut out)?;
        let json = String::from_utf8(out)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(json)
    }
}
