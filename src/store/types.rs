use serde::{Deserialize, Serialize};

/// A single versioned record.
///
/// Field names are capitalised on disk so the snapshot file reads
/// `{"key": {"Key": .., "Value": [..], "Version": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
    pub version: i64,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>, version: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            version,
        }
    }
}
