//! Submission documents.
//!
//! A submission is kept as a JSON object so that every field the ingester does
//! not rewrite passes through untouched, in its original key order.

use crate::error::SubmissionError;
use serde_json::{Map, Value};

pub use kcidb_store::ObjectKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    root: Map<String, Value>,
}

impl Submission {
    /// Parse a UTF-8 JSON document.
    pub fn parse(bytes: &[u8]) -> Result<Self, SubmissionError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SubmissionError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(SubmissionError::NotAnObject),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Mutable access to every object of one collection.
    ///
    /// A missing collection yields nothing; anything but an array of objects
    /// is an error.
    pub fn objects_mut(
        &mut self,
        kind: ObjectKind,
    ) -> Result<Vec<&mut Map<String, Value>>, SubmissionError> {
        let collection = kind.collection();
        let Some(value) = self.root.get_mut(collection) else {
            return Ok(Vec::new());
        };
        let items = value
            .as_array_mut()
            .ok_or(SubmissionError::NotAnArray { collection })?;

        items
            .iter_mut()
            .map(|item| {
                item.as_object_mut()
                    .ok_or(SubmissionError::NotAnArray { collection })
            })
            .collect()
    }
}
