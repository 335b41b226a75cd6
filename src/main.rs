// medprompt - command line access to the prompt hub's local state

use anyhow::Context;
use clap::Parser;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use medprompt_state::cli::{dispatch, Cli};
use medprompt_state::config::{load_config, StorageBackend};
use medprompt_state::error_tracker::ErrorTracker;
use medprompt_state::logging::init_tracing;
use medprompt_state::{StateHub, SystemClock};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if cli.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    init_tracing(&config.logging);

    let tracker = Arc::new(
        ErrorTracker::from_config(&config.error_tracking, Arc::new(SystemClock))
            .context("failed to set up error tracking")?,
    );
    tracker.start()?;

    let hub = StateHub::open(&config).context("failed to open state store")?;
    info!(sink = tracker.sink_name(), "medprompt ready");

    let mut stdout = std::io::stdout().lock();
    let result = dispatch(cli.command, &hub, &mut stdout);
    drop(stdout);

    if let Err(e) = &result {
        error!(error = %e, "command failed");
        let mut context = BTreeMap::new();
        context.insert("source".to_string(), "cli".to_string());
        tracker.capture(format!("{e:#}"), context);
    }

    let flushed = tracker.stop().await;
    if flushed > 0 {
        info!(flushed, "error reports delivered");
    }
    result
}
