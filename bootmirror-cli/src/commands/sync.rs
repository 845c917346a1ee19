//! The `sync` command: one cycle, no daemon, no servers.

use anyhow::Context;
use bootmirror::metrics::MetricsRegistry;
use bootmirror::{Config, SyncOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn execute(config: Config) -> anyhow::Result<()> {
    config.validate().context("error validating config")?;

    let metrics = MetricsRegistry::new();
    let orchestrator = SyncOrchestrator::from_config(&config, &metrics, CancellationToken::new())
        .context("cannot create sync orchestrator")?;

    orchestrator.run_cycle()?;
    info!("sync cycle finished");

    Ok(())
}
