use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod errlog;
mod inspector;
mod messaging;

use errlog::ErrorLog;
use inspector::IssuerInspector;

/// Host name the browser-side manifest registers.
const HOST_NAME: &str = "com.zwatch.detector";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Diagnostic log file (default: native_app_error.log beside the executable)
    #[arg(long, env = "ZWATCH_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Deadline in seconds for each of TCP connect and TLS handshake
    #[arg(long, env = "ZWATCH_CONNECT_TIMEOUT", default_value_t = 5)]
    connect_timeout: u64,

    /// Check a single hostname and print the response JSON instead of serving stdio
    #[arg(long, value_name = "HOSTNAME")]
    check: Option<String>,

    /// Print a Chrome native-messaging manifest for the given extension id
    #[arg(long, value_name = "EXTENSION_ID")]
    manifest: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames; anything human-readable goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(extension_id) = args.manifest.as_deref() {
        return print_manifest(extension_id);
    }

    let errlog = args
        .log_file
        .map(ErrorLog::new)
        .unwrap_or_else(ErrorLog::beside_executable);
    let inspector = IssuerInspector::new(errlog.clone(), Duration::from_secs(args.connect_timeout));

    if let Some(hostname) = args.check.as_deref() {
        let response = messaging::handle_request(&inspector, Some(hostname)).await;
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    info!("🛰️ zwatch host started (log: {})", errlog.path().display());

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    if let Err(e) = messaging::run(&mut stdin, &mut stdout, &inspector).await {
        errlog.append(&format!("Main loop error: {e:#}"));
        return Err(e);
    }

    info!("input closed, shutting down");
    Ok(())
}

fn print_manifest(extension_id: &str) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("cannot resolve executable path")?;
    let manifest = serde_json::json!({
        "name": HOST_NAME,
        "description": "Reports whether TLS to a hostname is re-signed by an interception middlebox",
        "path": exe,
        "type": "stdio",
        "allowed_origins": [format!("chrome-extension://{extension_id}/")],
    });
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
