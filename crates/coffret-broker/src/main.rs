//! The Coffret broker daemon.
//!
//! Headless runtime for the vault: verifies the licence, unlocks the
//! vault at the terminal, serves the loopback access endpoint, and locks
//! everything back down on ctrl-c. Desktop shells embed the library
//! crates directly; this binary is the CLI-facing equivalent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use coffret_broker::{
    shutdown, AccessServer, ActivityTracker, BrokerConfig, IdleLock, LicenseVerifier,
    TerminalApproval,
};
use coffret_vault::{EventLogger, VaultStore};

#[derive(Parser)]
#[command(name = "coffret-broker", version, about = "Coffret secrets broker")]
struct Args {
    /// Data directory holding the vault files (default: ~/.coffret).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the idle auto-lock timeout, in minutes.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Activate the given licence key against the licence server, save
    /// the result, and exit.
    #[arg(long, value_name = "USER_KEY")]
    activate: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let data_dir = args.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data directory {}", data_dir.display()))?;

    let mut config = BrokerConfig::load(&data_dir);
    if let Some(minutes) = args.idle_timeout {
        config.idle_lock_timeout_minutes = minutes;
    }

    let verifier = LicenseVerifier::new(&data_dir).with_endpoint(&config.license_endpoint);

    if let Some(user_key) = args.activate.as_deref() {
        let password = rpassword::prompt_password("Licence password: ")?;
        let activation = verifier
            .check_license_with_server(user_key, &password)
            .await
            .map_err(|e| anyhow::anyhow!("activation failed: {e}"))?;
        verifier.save_license(&activation.licence, &activation.signature)?;
        println!("Licence verified and saved.");
        return Ok(());
    }

    let status = verifier.check_local_license();
    if !status.valid {
        bail!(
            "no valid licence ({}); run `coffret-broker --activate <key>` first",
            status
                .reason
                .map_or_else(|| "unknown".to_string(), |r| format!("{r:?}"))
        );
    }

    let vault = VaultStore::new(&data_dir);
    let logger = Arc::new(EventLogger::new(&data_dir));
    vault.attach_logger(Arc::clone(&logger));

    let first_run = !vault.exists();
    let prompt = if first_run {
        "Choose a master password: "
    } else {
        "Master password: "
    };
    let password = rpassword::prompt_password(prompt)?;

    let unlock_vault = vault.clone();
    tokio::task::spawn_blocking(move || {
        if first_run {
            unlock_vault.setup(&password)
        } else {
            unlock_vault.unlock(&password)
        }
    })
    .await
    .context("unlock task panicked")??;

    let tracker = Arc::new(ActivityTracker::new());
    let server = AccessServer::start(
        vault.clone(),
        Arc::clone(&logger),
        Arc::new(TerminalApproval),
        Arc::clone(&tracker),
    )
    .await?;
    logger.log_app("Broker started");
    println!("Coffret broker listening on 127.0.0.1:{}", server.port());

    let idle = IdleLock::spawn(
        vault.clone(),
        Arc::clone(&tracker),
        Duration::from_secs(config.idle_lock_timeout_minutes.saturating_mul(60)),
    );

    tokio::signal::ctrl_c().await.context("signal handler")?;
    tracing::info!("ctrl-c received, shutting down");
    idle.cancel();
    shutdown(&vault, &logger, server).await?;
    Ok(())
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || PathBuf::from(".coffret"),
        |home| PathBuf::from(home).join(".coffret"),
    )
}
