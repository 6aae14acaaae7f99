//! Reference host for the bundle runtime
//!
//! Loads the configuration, sets up logging, composes the sample modules,
//! enables them and keeps them running until a shutdown signal arrives.

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;
use signals::{HostSignal, SignalListener};
use tracing::{error, info, warn};

async fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (before logging setup)
    let mut config = AppConfig::load_from_file(&args.config_path).await?;

    if let Some(data_dir) = args.data_dir {
        config.runtime.data_root = data_dir.to_string_lossy().to_string();
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    if let Err(e) = config.validate() {
        return Err(format!("Configuration validation failed: {}", e).into());
    }

    logging::setup_logging(&config.logging)?;
    info!(
        "🚀 Bundle host v{} | Config: {} | Data: {}",
        env!("CARGO_PKG_VERSION"),
        args.config_path.display(),
        config.runtime.data_root
    );

    let app = Application::compose(&config);
    if app.controllers().is_empty() {
        warn!("⚠️ No modules configured");
    }
    app.enable_all();

    if args.dump_registry {
        println!("{}", app.registry_json()?);
    } else {
        let mut listener = SignalListener::install()?;
        info!("🛑 Press Ctrl+C to shut down, send SIGHUP to reload modules");
        loop {
            match listener.next().await {
                HostSignal::Reload => {
                    app.reload_all();
                }
                HostSignal::Shutdown(_) => break,
            }
        }
        info!("🛑 Shutdown signal received, disabling modules...");
    }

    app.disable_all();
    info!("👋 Bundle host stopped");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("❌ Application error: {}", e);
        eprintln!("❌ Failed to run bundle host: {}", e);
        std::process::exit(1);
    }
}
