//! Manifest processing binary.
//!
//! Usage: `storyreel-worker <manifest.json> [project_id]`

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyreel_models::Manifest;
use storyreel_worker::{ProcessingRequest, ProcessingService, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["storyreel=info", "storyreel_media=info", "storyreel_worker=info"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let mut args = std::env::args().skip(1);
    let Some(manifest_path) = args.next() else {
        eprintln!("usage: storyreel-worker <manifest.json> [project_id]");
        std::process::exit(2);
    };
    let project_id = args.next();

    info!("Starting storyreel-worker");

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match PrometheusBuilder::new().with_http_listener(addr).install() {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    }

    let executor = config.build_executor();
    if let Err(e) = executor.verify_tools() {
        error!("Required tool missing: {}", e);
        std::process::exit(1);
    }

    let manifest = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(json) => match Manifest::from_json(&json) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to parse manifest {}: {}", manifest_path, e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Failed to read manifest {}: {}", manifest_path, e);
            std::process::exit(1);
        }
    };

    let request = ProcessingRequest {
        project_id,
        ..Default::default()
    };
    let service = ProcessingService::new(Arc::new(executor), &config);

    // dropping the run on ctrl-c kills in-flight tool processes
    let report = tokio::select! {
        result = service.process_manifest(&manifest, &request) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received shutdown signal, aborting run");
            std::process::exit(130);
        }
    };

    match report {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to serialize report: {}", e),
            }
            if report.final_video.is_none() {
                std::process::exit(1);
            }
            info!("Worker finished");
        }
        Err(e) => {
            error!("Processing failed: {}", e);
            std::process::exit(1);
        }
    }
}
