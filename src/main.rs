//! Device Compliance Agent - Main Entry Point
//!
//! Usage: `compliance-agent [--once]`
//!
//! Without flags the agent runs until Ctrl+C (or SIGTERM on unix). SIGHUP
//! reloads credentials and triggers an immediate sync. `--once` runs one
//! cycle per category, prints the compliance snapshot as JSON and exits.

use std::process::ExitCode;

use compliance_agent::constants::{APP_NAME, APP_VERSION};
use compliance_agent::logic::agent::enroll_from_env;
use compliance_agent::logic::credentials::FileCredentialStore;
use compliance_agent::{AgentConfig, ComplianceAgent};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    log::info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    match enroll_from_env(&FileCredentialStore::new(&config.data_dir)) {
        Ok(true) => log::info!("Enrolled from environment credentials"),
        Ok(false) => {}
        Err(e) => log::warn!("Failed to store environment credentials: {}", e),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("compliance-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config, once))
}

async fn run(config: AgentConfig, once: bool) -> ExitCode {
    let agent = match ComplianceAgent::new(config) {
        Ok(agent) => agent,
        Err(e) => {
            log::error!("Failed to initialize agent: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if once {
        let snapshot = agent.run_once().await;
        return match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("Failed to serialize compliance snapshot: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    agent.start();
    wait_for_shutdown(&agent).await;

    log::info!("Shutting down...");
    agent.stop().await;
    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown(agent: &ComplianceAgent) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut hangup, mut terminate) = match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
        (Ok(hangup), Ok(terminate)) => (hangup, terminate),
        _ => {
            log::warn!("Unix signal handlers unavailable; only Ctrl+C stops the agent");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate.recv() => break,
            _ = hangup.recv() => {
                log::info!("SIGHUP received: reloading credentials");
                agent.reload_credentials();
                for (category, outcome) in agent.sync_all() {
                    log::info!("Manual {} sync: {:?}", category, outcome);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_agent: &ComplianceAgent) {
    let _ = tokio::signal::ctrl_c().await;
}
