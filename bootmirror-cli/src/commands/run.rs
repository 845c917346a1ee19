//! The `run` command: sync daemon plus cache file servers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bootmirror::metrics::{CacheMetrics, MetricsRegistry};
use bootmirror::{Config, SyncDaemon, SyncOrchestrator};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub fn execute(config: Config) -> anyhow::Result<()> {
    config.validate().context("error validating config")?;

    let cancel = CancellationToken::new();
    let metrics = MetricsRegistry::new();

    // Built outside the runtime: the engine uses blocking HTTP clients.
    let orchestrator = Arc::new(
        SyncOrchestrator::from_config(&config, &metrics, cancel.clone())
            .context("cannot create sync orchestrator")?,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot create runtime")?;

    runtime.block_on(async {
        info!("starting bootmirror");

        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("received stop signal, shutting down...");
            signal_cancel.cancel();
        });

        let mut servers: Vec<JoinHandle<()>> = Vec::new();
        servers.push(spawn_server(
            config.image_bind_address.clone(),
            config.image_root_path(),
            Arc::clone(&metrics.images),
            cancel.clone(),
        ));
        if config.kernel_cache_enabled {
            servers.push(spawn_server(
                config.kernel_bind_address.clone(),
                config.kernel_root_path(),
                Arc::clone(&metrics.kernels),
                cancel.clone(),
            ));
        }
        if config.boot_image_cache_enabled {
            servers.push(spawn_server(
                config.boot_image_bind_address.clone(),
                config.boot_image_root_path(),
                Arc::clone(&metrics.boot_images),
                cancel.clone(),
            ));
        }

        let daemon = SyncDaemon::new(
            Arc::clone(&orchestrator),
            Duration::from_secs(config.sync_interval_secs),
        );
        let daemon_handle = tokio::spawn(daemon.run(cancel.clone()));

        let _ = daemon_handle.await;
        for server in servers {
            let _ = server.await;
        }

        Ok(())
    })
}

/// Serve one cache root in the background.
///
/// A server failure (bind conflict, socket error) takes the whole process
/// down via the cancellation token; running without a serving endpoint
/// would defeat the cache.
fn spawn_server(
    bind_address: String,
    serve_root: PathBuf,
    metrics: Arc<CacheMetrics>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) =
            bootmirror::server::serve(&bind_address, serve_root, metrics, cancel.clone()).await
        {
            error!(bind_address = %bind_address, error = %e, "cache file server failed, shutting down");
            cancel.cancel();
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "cannot install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
