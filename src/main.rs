//! CLI entry point for the trackbatch tool.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use trackbatch_core::config::load_file_config;
use trackbatch_core::pool::{DEFAULT_FETCH_ARGS, DEFAULT_FETCH_PROGRAM};
use trackbatch_core::resolve::DEFAULT_API_BASE;
use trackbatch_core::{
    BatchError, BatchOrchestrator, BatchRequest, BatchResponse, BatchSettings, CommandFetcher,
    EnvCredentialProvider, ErrorResponse, FetchClient, FileConfig, LocalObjectStore,
    MetadataResolver, RateGate,
};

mod cli;

use cli::Args;

/// Default directory receiving finished archives.
const DEFAULT_STORE_DIR: &str = "trackbatch-archives";

/// Exit code for rejected requests.
const EXIT_VALIDATION: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries only the JSON response.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(response) => match serde_json::to_string_pretty(&response) {
            Ok(body) => {
                println!("{body}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to render response");
                ExitCode::FAILURE
            }
        },
        Err(e) => report_failure(&e),
    }
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    let Some(batch_error) = err.downcast_ref::<BatchError>() else {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    };

    if let Ok(body) = serde_json::to_string_pretty(&ErrorResponse::from(batch_error)) {
        println!("{body}");
    }
    if batch_error.is_client_error() {
        ExitCode::from(EXIT_VALIDATION)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(args: Args) -> Result<BatchResponse> {
    let file_config = load_file_config(args.config.as_deref())?.unwrap_or_default();
    let settings = merge_settings(&args, &file_config);

    let fetcher = build_fetcher(&args, &file_config, &settings);
    let store_dir = args
        .store_dir
        .clone()
        .or_else(|| file_config.store_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));
    debug!(store_dir = %store_dir.display(), program = fetcher.program(), "collaborators configured");

    let orchestrator = BatchOrchestrator::new(
        settings.clone(),
        Arc::new(fetcher),
        Arc::new(LocalObjectStore::new(store_dir)),
    )?;

    let request = read_request(args.input.as_deref())?;
    info!(tracks = request.descriptors().len(), "batch request loaded");

    let resolver = args.resolve_metadata.then(|| {
        let api_base = args
            .api_base
            .clone()
            .or_else(|| file_config.api_base.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let client =
            FetchClient::new(RateGate::new()).with_max_attempts(settings.retry.max_attempts);
        MetadataResolver::new(client, Arc::new(EnvCredentialProvider::new()), api_base)
    });

    let report = orchestrator.run_request(request, resolver.as_ref()).await?;
    Ok(report.into_response())
}

/// Applies CLI overrides on top of file config and defaults.
fn merge_settings(args: &Args, file_config: &FileConfig) -> BatchSettings {
    let mut settings = file_config.apply_to(BatchSettings::default());
    if let Some(concurrency) = args.concurrency {
        settings.concurrency = usize::from(concurrency);
    }
    if let Some(max_items) = args.max_items {
        settings.max_items = usize::from(max_items);
    }
    if let Some(secs) = args.item_timeout_secs {
        settings.item_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = args.batch_timeout_secs {
        settings.batch_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(secs) = args.presign_ttl_secs {
        settings.presign_ttl = Duration::from_secs(secs);
    }
    if let Some(root) = &args.workspace_root {
        settings.workspace_root = Some(root.clone());
    }
    if let Some(name) = &args.archive_name {
        settings.archive_name.clone_from(name);
    }
    if let Some(max_attempts) = args.max_attempts {
        settings.retry.max_attempts = max_attempts;
    }
    settings
}

fn build_fetcher(args: &Args, file_config: &FileConfig, settings: &BatchSettings) -> CommandFetcher {
    let program = args
        .fetcher
        .clone()
        .or_else(|| file_config.fetcher.clone())
        .unwrap_or_else(|| DEFAULT_FETCH_PROGRAM.to_string());

    let template: Vec<String> = if !args.fetcher_args.is_empty() {
        args.fetcher_args.clone()
    } else if let Some(configured) = &file_config.fetcher_args {
        configured.clone()
    } else if program == DEFAULT_FETCH_PROGRAM {
        DEFAULT_FETCH_ARGS.iter().map(ToString::to_string).collect()
    } else {
        vec!["{url}".to_string()]
    };

    CommandFetcher::new(program, template).with_deadline(settings.item_timeout)
}

fn read_request(input: Option<&Path>) -> Result<BatchRequest> {
    let raw = match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file '{}'", path.display()))?,
        _ => {
            if io::stdin().is_terminal() {
                return Err(BatchError::validation(
                    "no request provided: pass --input FILE or pipe JSON on stdin",
                )
                .into());
            }
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read request from stdin")?;
            buffer
        }
    };

    serde_json::from_str(&raw)
        .map_err(|e| BatchError::validation(format!("invalid request body: {e}")).into())
}
