use std::collections::HashMap;
use std::time::Instant;

use actix_multipart::Multipart;
use actix_web::{error::InternalError, web, HttpResponse, ResponseError, Result};
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::LoanError;
use crate::inference::PredictionService;
use crate::models::{
    ApiResponse, ApplicantRecord, Decision, HealthStatus, PredictionRequest, PredictionResponse,
};
use crate::render;

/// Form parts expected by the upload endpoint, in merge order.
pub const UPLOAD_PARTS: [&str; 3] = ["applicant", "financial", "loan"];

pub struct AppState {
    pub service: PredictionService,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(service: PredictionService, max_upload_bytes: usize) -> Self {
        AppState {
            service,
            max_upload_bytes,
        }
    }

    fn model_version(&self) -> String {
        self.service
            .model()
            .map(|m| m.version().to_string())
            .unwrap_or_default()
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json = web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(ApiResponse::<()>::error(&err.to_string()));
            InternalError::from_response(err, response).into()
        });

    cfg.app_data(json)
        .route("/", web::get().to(index))
        .route("/predict", web::post().to(predict_form))
        .route("/predict/upload", web::post().to(predict_upload))
        .route("/api/health", web::get().to(health))
        .route("/api/model-info", web::get().to(model_info))
        .route("/api/predict", web::post().to(predict_json))
        .route("/api/batch-predict", web::post().to(batch_predict));
}

/// Runs the pipeline off the async workers.
async fn decide(state: &web::Data<AppState>, record: ApplicantRecord) -> Result<(ApplicantRecord, Decision), LoanError> {
    let state = state.clone();
    let (record, decision) = web::block(move || {
        let decision = state.service.evaluate(&record);
        (record, decision)
    })
    .await
    .map_err(|e| LoanError::Inference(e.to_string()))?;
    let decision = decision?;
    info!(
        "prediction: {} (score {})",
        decision.label,
        decision.score.map(|s| format!("{:.3}", s)).unwrap_or_else(|| "n/a".into())
    );
    Ok((record, decision))
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

fn html_error(err: &LoanError) -> HttpResponse {
    warn!("rejected application: {}", err);
    HttpResponse::build(err.status_code())
        .content_type("text/html; charset=utf-8")
        .body(render::error_page(&err.to_string()))
}

async fn index(state: web::Data<AppState>) -> HttpResponse {
    html(render::index_page(state.service.is_loaded()))
}

pub async fn predict_form(
    state: web::Data<AppState>,
    form: web::Form<HashMap<String, String>>,
) -> HttpResponse {
    let record: ApplicantRecord = form
        .into_inner()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    match decide(&state, record).await {
        Ok((record, decision)) => html(render::result_page(&record, &decision)),
        Err(e) => html_error(&e),
    }
}

async fn read_upload(mut payload: Multipart, limit: usize) -> Result<ApplicantRecord, LoanError> {
    let mut parts: HashMap<String, Vec<u8>> = HashMap::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| LoanError::Upload(e.to_string()))?;
        let name = field
            .content_disposition()
            .get_name()
            .map(str::to_string)
            .ok_or_else(|| LoanError::Upload("form part without a name".into()))?;

        if !UPLOAD_PARTS.contains(&name.as_str()) {
            debug!("discarding unexpected form part `{}`", name);
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| LoanError::Upload(e.to_string()))?;
            }
            continue;
        }
        if parts.contains_key(&name) {
            return Err(LoanError::Upload(format!("`{}` was uploaded more than once", name)));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| LoanError::Upload(e.to_string()))?;
            if bytes.len() + chunk.len() > limit {
                return Err(LoanError::Upload(format!(
                    "`{}` is larger than {} bytes",
                    name, limit
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        parts.insert(name, bytes);
    }

    let mut documents = Vec::with_capacity(UPLOAD_PARTS.len());
    for name in UPLOAD_PARTS {
        let bytes = parts
            .get(name)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| LoanError::Upload(format!("missing file `{}`", name)))?;
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| LoanError::Upload(format!("`{}` is not valid JSON: {}", name, e)))?;
        documents.push(document);
    }
    ApplicantRecord::from_documents(documents)
}

pub async fn predict_upload(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let record = match read_upload(payload, state.max_upload_bytes).await {
        Ok(record) => record,
        Err(e) => return html_error(&e),
    };
    match decide(&state, record).await {
        Ok((record, decision)) => html(render::result_page(&record, &decision)),
        Err(e) => html_error(&e),
    }
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(HealthStatus {
        status: "ok",
        model_loaded: state.service.is_loaded(),
    }))
}

async fn model_info(state: web::Data<AppState>) -> Result<HttpResponse, LoanError> {
    let info = state.service.model()?.info();
    Ok(HttpResponse::Ok().json(ApiResponse::success(info)))
}

pub async fn predict_json(
    state: web::Data<AppState>,
    req: web::Json<PredictionRequest>,
) -> Result<HttpResponse, LoanError> {
    let started = Instant::now();
    let outcome = match req.into_inner().into_record() {
        Ok(record) => decide(&state, record).await,
        Err(e) => Err(e),
    };
    let (_, decision) = outcome.map_err(|e| {
        warn!("rejected application: {}", e);
        e
    })?;
    let response = PredictionResponse::new(decision, &state.model_version());
    Ok(HttpResponse::Ok().json(ApiResponse::success(response).timed(started)))
}

pub async fn batch_predict(
    state: web::Data<AppState>,
    req: web::Json<Vec<PredictionRequest>>,
) -> HttpResponse {
    let started = Instant::now();
    let requests = req.into_inner();
    info!("batch prediction for {} applications", requests.len());

    if requests.is_empty() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error("no applications submitted").timed(started));
    }

    let version = state.model_version();
    let mut results = Vec::with_capacity(requests.len());
    for (i, request) in requests.into_iter().enumerate() {
        let outcome = match request.into_record() {
            Ok(record) => decide(&state, record).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok((_, decision)) => results.push(PredictionResponse::new(decision, &version)),
            Err(e) => {
                warn!("batch entry {} rejected: {}", i + 1, e);
                return HttpResponse::build(e.status_code()).json(
                    ApiResponse::<()>::error(&format!("application {}: {}", i + 1, e)).timed(started),
                );
            }
        }
    }
    HttpResponse::Ok().json(ApiResponse::success(results).timed(started))
}
