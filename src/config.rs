use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_MODEL_PATH: &str = "models/loan_approval_model.json";

#[derive(Debug, Parser)]
#[command(name = "loan-approval", version, about = "Loan approval predictions from applicant JSON files")]
pub struct Cli {
    /// Path to the model artifact
    #[arg(long, env = "LOAN_MODEL_PATH", default_value = DEFAULT_MODEL_PATH, global = true)]
    pub model: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the web form and JSON API
    Serve(ServerConfig),
    /// Predict one application from its three JSON documents
    Predict {
        #[arg(long)]
        applicant: PathBuf,
        #[arg(long)]
        financial: PathBuf,
        #[arg(long)]
        loan: PathBuf,
    },
    /// Predict every application in a JSON array of {applicant, financial, loan}
    Batch { input: PathBuf },
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Worker threads; defaults to the number of CPUs
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Size limit for each uploaded JSON file
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 64 * 1024)]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
