mod config;
mod errors;
mod monitor;
mod otel;
mod probe;
mod tui;
mod ui_state;
mod web_server;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};
use web_server::{metrics_addr, start_prometheus_server};

use crate::{
    config::load_initial_systems,
    monitor::{Monitor, MonitorSettings},
    ui_state::UiState,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Export a template polling spec to template.json
    #[arg(long)]
    template: bool,

    /// Load a polling spec from file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Write logs to this file while the terminal UI runs
    #[arg(long, env = otel::LOG_FILE_ENV)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.template {
        return match config::write_template(config::TEMPLATE_FILE).await {
            Ok(()) => {
                println!("Wrote polling spec to {}", config::TEMPLATE_FILE);
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", e);
                ExitCode::from(1)
            }
        };
    }

    let otel_state = match otel::init(args.log_file.as_deref()) {
        Ok(state) => state,
        Err(e) => {
            println!("Failed to initialise logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let systems = match load_initial_systems(args.file.as_deref()).await {
        Ok(systems) => systems,
        Err(e) => {
            println!("{}", e);
            otel_state.shutdown();
            return ExitCode::from(1);
        }
    };

    if let Some(registry) = &otel_state.metrics.registry {
        tokio::spawn(start_prometheus_server(registry.clone(), metrics_addr()));
    }

    let redraw = Arc::new(Notify::new());
    let ui_state = {
        let redraw = redraw.clone();
        UiState::new(Arc::new(move || redraw.notify_one()))
    };
    let monitor = Monitor::new(MonitorSettings::default());
    ui_state.attach(&monitor);

    let exit_code = match monitor.load(systems).await {
        Ok(()) => {
            let ui = tokio::spawn(tui::run_tui(
                monitor.clone(),
                ui_state,
                redraw,
                args.file,
            ));
            match ui.await {
                Ok(Ok(())) => ExitCode::SUCCESS,
                Ok(Err(e)) => {
                    error!(error = %e, "terminal UI failed");
                    eprintln!("{}", e);
                    ExitCode::from(1)
                }
                Err(e) => {
                    error!(error = %e, "terminal UI task panicked");
                    ExitCode::from(2)
                }
            }
        }
        Err(e) => {
            println!("{}", e);
            ExitCode::from(1)
        }
    };

    monitor.shutdown().await;
    otel_state.shutdown();
    info!("syspoll stopped");
    exit_code
}

#[cfg(test)]
mod test_utils;
