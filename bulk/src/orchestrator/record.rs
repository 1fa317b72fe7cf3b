use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

/// One input record of a bulk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// External identifier used to find the destination record.
    pub identifier: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl SourceRecord {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A destination record in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub identifier: String,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Record {
    pub fn new(id: RecordId, identifier: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            fields: BTreeMap::new(),
        }
    }
}

/// A named set of input records submitted as one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSet {
    pub name: String,
    pub records: Vec<SourceRecord>,
}

impl SourceSet {
    pub fn new(name: impl Into<String>, records: Vec<SourceRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}
