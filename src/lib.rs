pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod models;
pub mod normalizer;
pub mod render;

use std::fs;
use std::path::Path;

use serde_json::Value;

pub use error::{LoanError, Result};
pub use inference::{LoanModel, PredictionService};
pub use models::{ApplicantRecord, Decision, FeatureVector, Label, PredictionRequest};
pub use normalizer::Normalizer;

/// Reads one JSON input document from disk.
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| LoanError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builds a record from the applicant, financial and loan documents on disk.
pub fn load_record<P: AsRef<Path>>(applicant: P, financial: P, loan: P) -> Result<ApplicantRecord> {
    ApplicantRecord::from_documents([
        read_document(applicant)?,
        read_document(financial)?,
        read_document(loan)?,
    ])
}

/// Reads a JSON array of `{applicant, financial, loan}` objects.
pub fn load_batch<P: AsRef<Path>>(path: P) -> Result<Vec<PredictionRequest>> {
    let document = read_document(path)?;
    Ok(serde_json::from_value(document)?)
}
