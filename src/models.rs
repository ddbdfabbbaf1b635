use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{LoanError, Result};

/// Raw applicant, financial and loan attributes keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicantRecord {
    fields: BTreeMap<String, Value>,
}

impl ApplicantRecord {
    pub fn from_object(object: Map<String, Value>) -> Self {
        ApplicantRecord {
            fields: object.into_iter().collect(),
        }
    }

    /// Merges several flat JSON objects into one record. A key present in
    /// more than one document must carry the same value everywhere.
    pub fn from_documents<I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut fields = BTreeMap::new();
        for (index, document) in documents.into_iter().enumerate() {
            let object = match document {
                Value::Object(object) => object,
                other => {
                    return Err(LoanError::invalid(
                        &format!("document #{}", index + 1),
                        format!("expected a JSON object, got {}", json_kind(&other)),
                    ))
                }
            };
            for (key, value) in object {
                match fields.entry(key) {
                    Entry::Occupied(existing) => {
                        if *existing.get() != value {
                            return Err(LoanError::invalid(
                                existing.key(),
                                "conflicting values across input documents",
                            ));
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(value);
                    }
                }
            }
        }
        Ok(ApplicantRecord { fields })
    }

    /// Returns the value of `name`, treating `null` and blank strings as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            value => Some(value),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for ApplicantRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        ApplicantRecord {
            fields: iter.into_iter().collect(),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Model-ready encoding of one record, in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        FeatureVector(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Approved,
    Denied,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Approved => f.write_str("approved"),
            Label::Denied => f.write_str("denied"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub label: Label,
    /// Approval probability in [0, 1], when the classifier exposes one.
    pub score: Option<f32>,
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        self.label == Label::Approved
    }
}

/// The three JSON documents describing one application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionRequest {
    pub applicant: Value,
    pub financial: Value,
    pub loan: Value,
}

impl PredictionRequest {
    pub fn into_record(self) -> Result<ApplicantRecord> {
        ApplicantRecord::from_documents([self.applicant, self.financial, self.loan])
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub request_id: Uuid,
    pub decision: Decision,
    pub model_version: String,
}

impl PredictionResponse {
    pub fn new(decision: Decision, model_version: &str) -> Self {
        PredictionResponse {
            request_id: Uuid::new_v4(),
            decision,
            model_version: model_version.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub features: Vec<String>,
    pub threshold: f32,
    pub classifier: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
    pub execution_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn timed(mut self, started: std::time::Instant) -> Self {
        self.execution_time_ms = Some(started.elapsed().as_millis() as u64);
        self
    }
}
