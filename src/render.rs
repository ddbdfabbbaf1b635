//! HTML pages for the web form and plain text for the console.

use std::fmt::Write;

use serde_json::Value;

use crate::models::{ApplicantRecord, Decision};

const STYLE: &str = r#"<style>
body { font-family: sans-serif; background: linear-gradient(135deg, #0f2027, #203a43, #2c5364); color: #fff; margin: 0; padding: 2rem; min-height: 100vh; }
h1, h2, h3 { color: #00e5ff; text-align: center; }
.card { background: rgba(255,255,255,0.1); padding: 1.5rem; border-radius: 15px; margin: 0 auto 1rem; max-width: 720px; }
.warn { background: rgba(255,82,82,0.3); }
label { display: block; margin-top: .6rem; }
button { background: #00c853; color: #fff; border: none; border-radius: 10px; padding: .5rem 1rem; margin-top: 1rem; }
table { width: 100%; border-collapse: collapse; }
td, th { border-bottom: 1px solid rgba(255,255,255,0.2); padding: .3rem; text-align: left; }
.center { text-align: center; }
</style>"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title>{}</head><body>{}<p class=\"center\"><a href=\"/\">Back to the form</a></p></body></html>",
        escape(title),
        STYLE,
        body
    )
}

fn select(name: &str, label: &str, options: &[&str]) -> String {
    let mut html = format!("<label>{} <select name=\"{}\">", label, name);
    for option in options {
        let _ = write!(html, "<option value=\"{0}\">{0}</option>", escape(option));
    }
    html.push_str("</select></label>");
    html
}

fn number(name: &str, label: &str, step: u32) -> String {
    format!(
        "<label>{} <input type=\"number\" name=\"{}\" min=\"0\" step=\"{}\" value=\"0\"></label>",
        label, name, step
    )
}

pub fn index_page(model_loaded: bool) -> String {
    let mut body = String::from("<h1>Loan Approval Prediction</h1>");
    if !model_loaded {
        body.push_str(
            "<div class=\"card warn center\">The model could not be loaded. Predictions are unavailable.</div>",
        );
    }

    body.push_str(
        "<div class=\"card\"><h3>Upload application files</h3>\
         <form action=\"/predict/upload\" method=\"post\" enctype=\"multipart/form-data\">\
         <label>Applicant details <input type=\"file\" name=\"applicant\" accept=\".json\"></label>\
         <label>Financial details <input type=\"file\" name=\"financial\" accept=\".json\"></label>\
         <label>Loan details <input type=\"file\" name=\"loan\" accept=\".json\"></label>\
         <button type=\"submit\">Predict Loan Approval</button></form></div>",
    );

    body.push_str("<div class=\"card\"><h3>Or enter applicant details</h3><form action=\"/predict\" method=\"post\">");
    body.push_str(&select("Gender", "Gender", &["Male", "Female"]));
    body.push_str(&select("Married", "Married", &["Yes", "No"]));
    body.push_str(&select("Dependents", "Dependents", &["0", "1", "2", "3+"]));
    body.push_str(&select("Education", "Education", &["Graduate", "Not Graduate"]));
    body.push_str(&select("Self_Employed", "Self Employed", &["Yes", "No"]));
    body.push_str(&number("ApplicantIncome", "Applicant Income", 100));
    body.push_str(&number("CoapplicantIncome", "Coapplicant Income", 100));
    body.push_str(&number("LoanAmount", "Loan Amount", 10));
    body.push_str(&select(
        "Loan_Amount_Term",
        "Loan Term (months)",
        &["12", "36", "60", "120", "180", "240", "300", "360", "480"],
    ));
    body.push_str(&select("Credit_History", "Credit History", &["0", "1"]));
    body.push_str(&select("Property_Area", "Property Area", &["Urban", "Semiurban", "Rural"]));
    body.push_str("<button type=\"submit\">Predict Loan Approval</button></form></div>");

    page("Loan Approval Predictor", &body)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn summary_table(record: &ApplicantRecord) -> String {
    let mut html = String::from("<table><tr><th>Field</th><th>Value</th></tr>");
    for (name, value) in record.iter() {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape(name),
            escape(&display_value(value))
        );
    }
    html.push_str("</table>");
    html
}

pub fn result_page(record: &ApplicantRecord, decision: &Decision) -> String {
    let mut body = String::from("<h1>Loan Approval Prediction</h1><div class=\"card\"><h3>Applicant Summary</h3>");
    body.push_str(&summary_table(record));
    body.push_str("</div><div class=\"card center\">");
    if decision.is_approved() {
        body.push_str(
            "<h2>Loan Approved!</h2><p>Based on your details, your loan application is likely to be approved.</p>",
        );
    } else {
        body.push_str(
            "<h2>Loan Rejected</h2><p>Unfortunately, your loan application might not be approved. \
             Consider improving your credit history or income.</p>",
        );
    }
    if let Some(score) = decision.score {
        let _ = write!(
            body,
            "<progress max=\"1\" value=\"{:.4}\"></progress><p>Approval Probability: <b>{:.2}%</b></p>",
            score,
            score * 100.0
        );
    }
    body.push_str("</div>");
    page("Loan Approval Result", &body)
}

pub fn error_page(message: &str) -> String {
    let body = format!(
        "<h1>Loan Approval Prediction</h1><div class=\"card warn center\"><h3>Could not evaluate the application</h3><p>{}</p></div>",
        escape(message)
    );
    page("Loan Approval Error", &body)
}

/// One-line console rendering of a decision.
pub fn console(decision: &Decision) -> String {
    let headline = if decision.is_approved() {
        "Loan Approved!"
    } else {
        "Loan Rejected"
    };
    match decision.score {
        Some(score) => format!("{} Approval Probability: {:.2}%", headline, score * 100.0),
        None => headline.to_string(),
    }
}
