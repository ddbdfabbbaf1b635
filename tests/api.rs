use std::path::PathBuf;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use loan_approval::handlers::{self, AppState};
use loan_approval::{LoanModel, PredictionService};
use serde_json::{json, Value};

const BOUNDARY: &str = "----loanformboundary";

fn state(loaded: bool) -> web::Data<AppState> {
    let service = if loaded {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/loan_approval_model.json");
        PredictionService::new(LoanModel::load(path).unwrap())
    } else {
        PredictionService::unloaded()
    };
    web::Data::new(AppState::new(service, 1024))
}

fn application() -> Value {
    json!({
        "applicant": {"Gender": "Male", "Married": "Yes", "Dependents": "0", "Education": "Graduate", "Self_Employed": "No"},
        "financial": {"ApplicantIncome": 5849, "CoapplicantIncome": 0, "Credit_History": 1},
        "loan": {"LoanAmount": 128, "Loan_Amount_Term": 360, "Property_Area": "Urban"}
    })
}

fn multipart_body(parts: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, content) in parts {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}.json\"\r\nContent-Type: application/json\r\n\r\n{}\r\n",
            BOUNDARY, name, name, content
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    body
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state).configure(handlers::configure)).await
    };
}

#[actix_rt::test]
async fn health_reports_model_state() {
    let app = app!(state(false));
    let req = test::TestRequest::get().uri("/api/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["model_loaded"], false);
}

#[actix_rt::test]
async fn model_info_lists_schema() {
    let app = app!(state(true));
    let req = test::TestRequest::get().uri("/api/model-info").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["version"], "1.0.0");
    assert_eq!(body["data"]["classifier"], "logistic");
    assert_eq!(body["data"]["features"].as_array().unwrap().len(), 11);
}

#[actix_rt::test]
async fn json_prediction_approves_sample() {
    let app = app!(state(true));
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .set_json(application())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["decision"]["label"], "approved");
    assert_eq!(body["data"]["model_version"], "1.0.0");
    assert!(body["data"]["request_id"].is_string());
    assert!(body["execution_time_ms"].is_u64());
}

#[actix_rt::test]
async fn json_prediction_without_model_is_unavailable() {
    let app = app!(state(false));
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .set_json(application())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not loaded"));
}

#[actix_rt::test]
async fn invalid_input_is_a_bad_request() {
    let app = app!(state(true));
    let mut payload = application();
    payload["financial"]["ApplicantIncome"] = json!("a lot");
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .set_json(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("ApplicantIncome"));
}

#[actix_rt::test]
async fn malformed_json_body_is_a_bad_request() {
    let app = app!(state(true));
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"applicant\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn batch_names_the_failing_entry() {
    let app = app!(state(true));
    let mut bad = application();
    bad["loan"]["Property_Area"] = json!("Moon");
    let req = test::TestRequest::post()
        .uri("/api/batch-predict")
        .set_json(json!([application(), bad]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("application 2:"));
}

#[actix_rt::test]
async fn batch_returns_one_decision_per_entry() {
    let app = app!(state(true));
    let req = test::TestRequest::post()
        .uri("/api/batch-predict")
        .set_json(json!([application(), application()]))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let results = body["data"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["decision"], results[1]["decision"]);

    let req = test::TestRequest::post()
        .uri("/api/batch-predict")
        .set_json(json!([]))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn index_serves_the_form() {
    let app = app!(state(true));
    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("action=\"/predict/upload\""));
    assert!(html.contains("name=\"Credit_History\""));
}

#[actix_rt::test]
async fn form_submission_renders_result() {
    let app = app!(state(true));
    let req = test::TestRequest::post()
        .uri("/predict")
        .set_form([
            ("Gender", "Male"),
            ("Married", "Yes"),
            ("Dependents", "0"),
            ("Education", "Graduate"),
            ("Self_Employed", "No"),
            ("ApplicantIncome", "5849"),
            ("CoapplicantIncome", "0"),
            ("LoanAmount", "128"),
            ("Loan_Amount_Term", "360"),
            ("Credit_History", "1"),
            ("Property_Area", "Urban"),
        ])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Loan Approved!"));
    assert!(html.contains("Approval Probability"));
}

#[actix_rt::test]
async fn form_missing_required_field_renders_error() {
    let app = app!(state(true));
    let req = test::TestRequest::post()
        .uri("/predict")
        .set_form([("ApplicantIncome", "5849"), ("Property_Area", "Urban")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Education"));
}

#[actix_rt::test]
async fn uploaded_files_are_evaluated() {
    let app = app!(state(true));
    let app_json = application();
    let applicant = app_json["applicant"].to_string();
    let financial = app_json["financial"].to_string();
    let loan = app_json["loan"].to_string();
    let body = multipart_body(&[
        ("applicant", applicant.as_str()),
        ("financial", financial.as_str()),
        ("loan", loan.as_str()),
    ]);
    let req = test::TestRequest::post()
        .uri("/predict/upload")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Loan Approved!"));
    assert!(html.contains("Property_Area"));
}

#[actix_rt::test]
async fn upload_missing_a_file_is_rejected() {
    let app = app!(state(true));
    let body = multipart_body(&[("applicant", "{\"Education\": \"Graduate\"}")]);
    let req = test::TestRequest::post()
        .uri("/predict/upload")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("missing file `financial`"));
}

#[actix_rt::test]
async fn oversized_upload_is_rejected() {
    let app = app!(state(true));
    let big = format!("{{\"Notes\": \"{}\"}}", "x".repeat(2048));
    let body = multipart_body(&[("applicant", big.as_str())]);
    let req = test::TestRequest::post()
        .uri("/predict/upload")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("larger than 1024 bytes"));
}

fn upload_request(body: String) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/predict/upload")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

#[actix_rt::test]
async fn unexpected_upload_parts_are_ignored() {
    let app = app!(state(true));
    let app_json = application();
    let applicant = app_json["applicant"].to_string();
    let financial = app_json["financial"].to_string();
    let loan = app_json["loan"].to_string();
    let notes = "n".repeat(4096);
    let body = multipart_body(&[
        ("notes", notes.as_str()),
        ("applicant", applicant.as_str()),
        ("financial", financial.as_str()),
        ("loan", loan.as_str()),
    ]);
    let resp = test::call_service(&app, upload_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("Loan Approved!"));
    assert!(!html.contains("notes"));
}

#[actix_rt::test]
async fn duplicate_upload_part_is_rejected() {
    let app = app!(state(true));
    let body = multipart_body(&[
        ("applicant", "{\"Education\": \"Graduate\"}"),
        ("applicant", "{\"Education\": \"Not Graduate\"}"),
    ]);
    let resp = test::call_service(&app, upload_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("`applicant` was uploaded more than once"));
}

#[actix_rt::test]
async fn non_object_document_is_a_bad_request() {
    let app = app!(state(true));
    let mut payload = application();
    payload["applicant"] = json!(["Male", "Yes"]);
    let req = test::TestRequest::post()
        .uri("/api/predict")
        .set_json(payload)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("document #1"));
}
