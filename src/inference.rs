use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::Array1;
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::error::{LoanError, Result};
use crate::models::{ApplicantRecord, Decision, FeatureVector, Label, ModelInfo};
use crate::normalizer::Normalizer;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn default_threshold() -> f32 {
    0.5
}

/// On-disk layout of the model artifact.
#[derive(Debug, Deserialize)]
struct ArtifactFile {
    version: String,
    #[serde(flatten)]
    normalizer: Normalizer,
    #[serde(default = "default_threshold")]
    threshold: f32,
    classifier: ClassifierSpec,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClassifierSpec {
    Logistic {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    Onnx {
        path: PathBuf,
        #[serde(default)]
        output: OnnxOutput,
    },
}

/// How to read the first output tensor of an ONNX classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnnxOutput {
    #[default]
    Probability,
    Logit,
    /// Per-class scores; the argmax is the label and no probability is reported.
    Classes,
}

pub enum Classifier {
    Logistic {
        coefficients: Array1<f64>,
        intercept: f64,
    },
    Onnx {
        plan: OnnxPlan,
        output: OnnxOutput,
    },
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classifier::Logistic { intercept, .. } => f
                .debug_struct("Logistic")
                .field("intercept", intercept)
                .finish_non_exhaustive(),
            Classifier::Onnx { output, .. } => f
                .debug_struct("Onnx")
                .field("output", output)
                .finish_non_exhaustive(),
        }
    }
}

impl Classifier {
    fn kind(&self) -> &'static str {
        match self {
            Classifier::Logistic { .. } => "logistic",
            Classifier::Onnx { .. } => "onnx",
        }
    }

    fn load_onnx(path: &Path, width: usize) -> Result<OnnxPlan> {
        let load = || -> TractResult<OnnxPlan> {
            tract_onnx::onnx()
                .model_for_path(path)?
                .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, width)))?
                .into_optimized()?
                .into_runnable()
        };
        load().map_err(|e| LoanError::Artifact(format!("{}: {}", path.display(), e)))
    }

    /// Returns `(approved, score)` for one standardized feature row.
    fn classify(&self, features: &[f32], threshold: f32) -> Result<(bool, Option<f32>)> {
        match self {
            Classifier::Logistic {
                coefficients,
                intercept,
            } => {
                let x: Array1<f64> = features.iter().map(|v| *v as f64).collect();
                let score = sigmoid(coefficients.dot(&x) + intercept) as f32;
                Ok((score >= threshold, Some(score)))
            }
            Classifier::Onnx { plan, output } => {
                let run = || -> TractResult<Vec<f32>> {
                    let input = Tensor::from_shape(&[1, features.len()], features)?;
                    let outputs = plan.run(tvec!(input.into()))?;
                    Ok(outputs[0].to_array_view::<f32>()?.iter().copied().collect())
                };
                let scores = run().map_err(|e| LoanError::Inference(e.to_string()))?;
                match output {
                    OnnxOutput::Classes => {
                        let (class, _) = scores
                            .iter()
                            .enumerate()
                            .max_by(|(_, a), (_, b)| a.total_cmp(b))
                            .ok_or_else(|| LoanError::Inference("model returned no output".into()))?;
                        Ok((class == 1, None))
                    }
                    OnnxOutput::Probability | OnnxOutput::Logit => {
                        let raw = *scores
                            .first()
                            .ok_or_else(|| LoanError::Inference("model returned no output".into()))?;
                        let score = if *output == OnnxOutput::Logit {
                            sigmoid(raw as f64) as f32
                        } else {
                            raw.clamp(0.0, 1.0)
                        };
                        Ok((score >= threshold, Some(score)))
                    }
                }
            }
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// The trained pipeline: feature schema, scaler and classifier.
/// Immutable once loaded.
#[derive(Debug)]
pub struct LoanModel {
    version: String,
    normalizer: Normalizer,
    threshold: f32,
    classifier: Classifier,
}

impl LoanModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| LoanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: ArtifactFile = serde_json::from_slice(&bytes)
            .map_err(|e| LoanError::Artifact(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let model = Self::from_artifact(artifact, base)?;
        info!(
            "loaded model {} ({} classifier, {} features) from {}",
            model.version,
            model.classifier.kind(),
            model.normalizer.width(),
            path.display()
        );
        Ok(model)
    }

    fn from_artifact(artifact: ArtifactFile, base: &Path) -> Result<Self> {
        let ArtifactFile {
            version,
            normalizer,
            threshold,
            classifier,
        } = artifact;

        normalizer.validate()?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(LoanError::Artifact(format!(
                "threshold {} is outside [0, 1]",
                threshold
            )));
        }

        let width = normalizer.width();
        let classifier = match classifier {
            ClassifierSpec::Logistic {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != width {
                    return Err(LoanError::Artifact(format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        width
                    )));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(LoanError::Artifact("non-finite model weights".into()));
                }
                Classifier::Logistic {
                    coefficients: Array1::from(coefficients),
                    intercept,
                }
            }
            ClassifierSpec::Onnx { path, output } => {
                let path = if path.is_absolute() { path } else { base.join(path) };
                Classifier::Onnx {
                    plan: Classifier::load_onnx(&path, width)?,
                    output,
                }
            }
        };

        Ok(LoanModel {
            version,
            normalizer,
            threshold,
            classifier,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn width(&self) -> usize {
        self.normalizer.width()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Decision> {
        if features.len() != self.width() {
            return Err(LoanError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                self.width(),
                features.len()
            )));
        }
        let (approved, score) = self.classifier.classify(features.as_slice(), self.threshold)?;
        if let Some(score) = score.filter(|s| !s.is_finite()) {
            return Err(LoanError::Inference(format!(
                "classifier produced a non-finite score ({})",
                score
            )));
        }
        let label = if approved { Label::Approved } else { Label::Denied };
        Ok(Decision { label, score })
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            version: self.version.clone(),
            features: self.normalizer.feature_names(),
            threshold: self.threshold,
            classifier: self.classifier.kind().to_string(),
        }
    }
}

/// Owns the model for the life of the process. The model is fixed at
/// construction; a service built without one answers every prediction
/// with [`LoanError::ModelNotLoaded`].
#[derive(Debug, Default)]
pub struct PredictionService {
    model: Option<LoanModel>,
}

impl PredictionService {
    pub fn new(model: LoanModel) -> Self {
        PredictionService { model: Some(model) }
    }

    pub fn unloaded() -> Self {
        PredictionService { model: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Result<&LoanModel> {
        self.model.as_ref().ok_or(LoanError::ModelNotLoaded)
    }

    pub fn normalize(&self, record: &ApplicantRecord) -> Result<FeatureVector> {
        self.model()?.normalizer().normalize(record)
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Decision> {
        self.model()?.predict(features)
    }

    /// Normalize then predict.
    pub fn evaluate(&self, record: &ApplicantRecord) -> Result<Decision> {
        let model = self.model()?;
        let features = model.normalizer().normalize(record)?;
        let decision = model.predict(&features)?;
        debug!("decision {} score {:?}", decision.label, decision.score);
        Ok(decision)
    }
}
