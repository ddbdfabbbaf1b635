use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{error, info, warn};

use loan_approval::config::{Cli, Command, ServerConfig};
use loan_approval::handlers::{self, AppState};
use loan_approval::{load_batch, load_record, render, LoanModel, PredictionService};

async fn serve(service: PredictionService, config: ServerConfig) -> std::io::Result<()> {
    let bind_address = config.bind_address();
    let state = web::Data::new(AppState::new(service, config.max_upload_bytes));

    info!("Server running at http://{}", bind_address);
    info!("   GET  /                   - web form");
    info!("   POST /api/predict        - single prediction");
    info!("   POST /api/batch-predict  - batch prediction");

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::configure)
    });
    let server = match config.workers {
        Some(workers) => server.workers(workers),
        None => server,
    };
    server.bind(&bind_address)?.run().await
}

fn print_or_exit(result: loan_approval::Result<loan_approval::Decision>) {
    match result {
        Ok(decision) => println!("{}", render::console(&decision)),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let loaded = LoanModel::load(&cli.model);

    match cli.command {
        Command::Serve(config) => {
            let service = match loaded {
                Ok(model) => PredictionService::new(model),
                Err(e) => {
                    warn!("starting without a model: {}", e);
                    PredictionService::unloaded()
                }
            };
            serve(service, config).await
        }
        Command::Predict {
            applicant,
            financial,
            loan,
        } => {
            let service = loaded.map(PredictionService::new);
            print_or_exit(service.and_then(|service| {
                let record = load_record(&applicant, &financial, &loan)?;
                service.evaluate(&record)
            }));
            Ok(())
        }
        Command::Batch { input } => {
            let service = match loaded {
                Ok(model) => PredictionService::new(model),
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            };
            let requests = match load_batch(&input) {
                Ok(requests) => requests,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            };
            for (i, request) in requests.into_iter().enumerate() {
                match request.into_record().and_then(|r| service.evaluate(&r)) {
                    Ok(decision) => println!("#{}: {}", i + 1, render::console(&decision)),
                    Err(e) => println!("#{}: error: {}", i + 1, e),
                }
            }
            Ok(())
        }
    }
}
