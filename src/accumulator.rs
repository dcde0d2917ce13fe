//! Shared, append-only result set.

use crate::types::{ResultRecord, Subject};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Merge one API record with the identity of the subject it was found for
///
/// Identity fields overwrite API fields of the same name. A record that is
/// not a JSON object is kept under a `record` key.
pub fn merge_record(subject: &Subject, record: Value) -> ResultRecord {
    let mut fields = match record {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("record".to_string(), other);
            map
        }
    };

    fields.insert("person_id".to_string(), Value::String(subject.id.0.clone()));
    fields.insert(
        "family_name".to_string(),
        Value::String(subject.family_name.clone()),
    );
    fields.insert("name".to_string(), Value::String(subject.name.clone()));
    fields.insert(
        "patronymic".to_string(),
        Value::String(subject.patronymic.clone()),
    );
    fields.insert(
        "birth_date".to_string(),
        Value::String(subject.birth_date.format("%Y-%m-%d").to_string()),
    );
    fields.insert(
        "death_date".to_string(),
        subject
            .death_date
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
    );

    ResultRecord::from_map(fields)
}

/// Handle to the result set shared by all workers
///
/// Cloning is cheap; every clone appends to the same set.
#[derive(Clone, Debug, Default)]
pub struct ResultAccumulator {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl ResultAccumulator {
    /// Create an empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `records` with `subject` and append them in one step
    ///
    /// Returns how many records were appended.
    pub async fn absorb(&self, subject: &Subject, records: Vec<Value>) -> usize {
        if records.is_empty() {
            return 0;
        }

        let merged: Vec<ResultRecord> = records
            .into_iter()
            .map(|record| merge_record(subject, record))
            .collect();
        let count = merged.len();

        self.records.lock().await.extend(merged);
        count
    }

    /// Copy of everything accumulated so far
    pub async fn snapshot(&self) -> Vec<ResultRecord> {
        self.records.lock().await.clone()
    }

    /// Number of records accumulated so far
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether nothing has been accumulated yet
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
