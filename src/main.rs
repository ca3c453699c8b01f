use std::process::ExitCode;

use reqwest::Method;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use api_connector::{ApiClient, ApiError, ConnectionConfig, RequestDescriptor, metrics};

const USAGE: &str = "usage: api-probe [METHOD] PATH [JSON_BODY]";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting api-probe v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run one request through a fully configured client, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let request = parse_args(std::env::args().skip(1).collect())?;

    let config = ConnectionConfig::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        base_url = %config.base_url,
        timeout_ms = config.timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let metrics_handle = if std::env::var("API_PROBE_METRICS").is_ok_and(|v| v == "true") {
        metrics::init_metrics()
            .map_err(|e| warn!(error = %e, "Continuing without metrics"))
            .ok()
    } else {
        None
    };

    let client = ApiClient::new(config).map_err(|e| {
        error!("Failed to build client: {e}");
        exitcode::CONFIG
    })?;

    let outcome = tokio::select! {
        outcome = client.request(request) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before the request settled");
            return Err(exitcode::TEMPFAIL);
        }
    };

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    match outcome {
        Ok(Some(response)) => {
            info!(
                status = %response.status(),
                duration_ms = response.duration().map(|d| d.as_millis() as u64),
                "Request succeeded"
            );
            let rendered = serde_json::to_string_pretty(response.body()).map_err(|e| {
                error!("Failed to render response body: {e}");
                exitcode::SOFTWARE
            })?;
            println!("{rendered}");
            Ok(())
        }
        Ok(None) => {
            warn!("Request was superseded");
            Err(exitcode::TEMPFAIL)
        }
        Err(e) => {
            error!("Request failed: {e}");
            if let Some(response) = e.response() {
                println!("{}", response.body);
            }
            Err(exit_code_for(&e))
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<RequestDescriptor, exitcode::ExitCode> {
    let usage = || {
        eprintln!("{USAGE}");
        exitcode::USAGE
    };

    let (method, rest) = match args.split_first() {
        Some((first, rest)) if !first.starts_with('/') && !first.contains("://") => {
            let method = Method::from_bytes(first.to_ascii_uppercase().as_bytes())
                .map_err(|_| usage())?;
            (method, rest)
        }
        Some(_) => (Method::GET, args.as_slice()),
        None => return Err(usage()),
    };

    let (path, body) = match rest {
        [path] => (path, None),
        [path, body] => (path, Some(body)),
        _ => return Err(usage()),
    };

    let mut request = RequestDescriptor::new(method, path.as_str());
    if let Some(body) = body {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            error!("Body is not valid JSON: {e}");
            exitcode::DATAERR
        })?;
        request = request.with_body(value);
    }
    Ok(request)
}

fn exit_code_for(error: &ApiError) -> exitcode::ExitCode {
    match error {
        ApiError::Network { .. } => exitcode::UNAVAILABLE,
        ApiError::Timeout { .. } => exitcode::TEMPFAIL,
        ApiError::Unauthorized(_) | ApiError::StepUpRequired { .. } => exitcode::NOPERM,
        ApiError::Status(_) => exitcode::PROTOCOL,
        ApiError::Config(_) | ApiError::InvalidHeader { .. } => exitcode::CONFIG,
        ApiError::Serialization { .. } => exitcode::DATAERR,
        ApiError::NoPendingStepUp | ApiError::Client(_) => exitcode::SOFTWARE,
    }
}
