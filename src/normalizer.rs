//! Turns an [`ApplicantRecord`] into the [`FeatureVector`] the classifier
//! was trained on: label-encode categoricals, impute missing values, keep
//! schema order, then standardize.

use std::collections::HashSet;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoanError, Result};
use crate::models::{json_kind, ApplicantRecord, FeatureVector};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Encoded as the index of the value in `classes`.
    Categorical {
        classes: Vec<String>,
        #[serde(default)]
        impute: Option<String>,
    },
    Numeric {
        #[serde(default)]
        median: Option<f64>,
        #[serde(default)]
        min: Option<f64>,
    },
}

/// Per-column standardization statistics captured at training time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    fn apply(&self, index: usize, value: f64) -> f64 {
        (value - self.mean[index]) / self.scale[index]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Normalizer {
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub scaler: Option<Standardizer>,
}

impl Normalizer {
    pub fn width(&self) -> usize {
        self.features.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Checks the schema is usable. Called once when the artifact loads.
    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(LoanError::Artifact("feature schema is empty".into()));
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(LoanError::Artifact(format!(
                    "feature `{}` is declared twice",
                    feature.name
                )));
            }
            if let FeatureKind::Categorical { classes, impute } = &feature.kind {
                if classes.is_empty() {
                    return Err(LoanError::Artifact(format!(
                        "feature `{}` has no classes",
                        feature.name
                    )));
                }
                let unique: HashSet<_> = classes.iter().collect();
                if unique.len() != classes.len() {
                    return Err(LoanError::Artifact(format!(
                        "feature `{}` has duplicate classes",
                        feature.name
                    )));
                }
                if let Some(default) = impute {
                    if !classes.contains(default) {
                        return Err(LoanError::Artifact(format!(
                            "feature `{}` imputes `{}` which is not one of its classes",
                            feature.name, default
                        )));
                    }
                }
            }
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.width() || scaler.scale.len() != self.width() {
                return Err(LoanError::Artifact(format!(
                    "scaler covers {} / {} columns but the schema has {}",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    self.width()
                )));
            }
            if let Some(i) = scaler.mean.iter().position(|m| !m.is_finite()) {
                return Err(LoanError::Artifact(format!(
                    "mean for `{}` must be finite",
                    self.features[i].name
                )));
            }
            if let Some(i) = scaler.scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
                return Err(LoanError::Artifact(format!(
                    "scale for `{}` must be finite and non-zero",
                    self.features[i].name
                )));
            }
        }
        Ok(())
    }

    pub fn normalize(&self, record: &ApplicantRecord) -> Result<FeatureVector> {
        for name in record.field_names() {
            if !self.features.iter().any(|f| f.name == name) {
                debug!("ignoring unrecognised field `{}`", name);
            }
        }

        let mut values = Vec::with_capacity(self.width());
        for (index, feature) in self.features.iter().enumerate() {
            let raw = encode(feature, record.get(&feature.name))?;
            let value = match &self.scaler {
                Some(scaler) => scaler.apply(index, raw),
                None => raw,
            };
            let value = value as f32;
            if !value.is_finite() {
                return Err(LoanError::invalid(&feature.name, "value out of range"));
            }
            values.push(value);
        }
        Ok(FeatureVector::new(values))
    }
}

fn encode(feature: &FeatureSpec, value: Option<&Value>) -> Result<f64> {
    let name = feature.name.as_str();
    match &feature.kind {
        FeatureKind::Categorical { classes, impute } => {
            let category = match value {
                Some(value) => category_of(name, value)?,
                None => impute.clone().ok_or_else(|| LoanError::missing_field(name))?,
            };
            classes
                .iter()
                .position(|c| *c == category)
                .map(|i| i as f64)
                .ok_or_else(|| LoanError::UnknownCategory {
                    field: name.to_string(),
                    value: category,
                    expected: classes.join(", "),
                })
        }
        FeatureKind::Numeric { median, min } => {
            let number = match value {
                Some(value) => number_of(name, value)?,
                None => median.ok_or_else(|| LoanError::missing_field(name))?,
            };
            match min {
                Some(min) if number < *min => Err(LoanError::invalid(
                    name,
                    format!("{} is below the minimum of {}", number, min),
                )),
                _ => Ok(number),
            }
        }
    }
}

fn category_of(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(LoanError::invalid(
            field,
            format!("expected a category label, got {}", json_kind(other)),
        )),
    }
}

fn number_of(field: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => {
            return Err(LoanError::invalid(
                field,
                format!("expected a number, got {}", json_kind(other)),
            ))
        }
    };
    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(LoanError::invalid(field, format!("`{}` is not a finite number", value_text(value)))),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
