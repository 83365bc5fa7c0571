/*!
 * Sandbox FS Daemon
 *
 * Watches a sandbox root and writes every change as one JSON line to
 * stdout until interrupted. Configured through `SANDBOX_FS_*` variables.
 */

use anyhow::{Context, Result};
use tracing::{info, warn};

use sandbox_fs::{init_tracing, FsConfig, SandboxFs};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = FsConfig::from_env().context("invalid configuration")?;
    info!(root = %config.root.display(), readonly = config.readonly, "sandbox-fsd starting");

    let fs = SandboxFs::from_config(&config).context("failed to open sandbox")?;
    let mut events = fs.events().stream();
    fs.start_watcher().await.context("failed to start watcher")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let line = serde_json::to_string(&event).context("failed to encode event")?;
                    println!("{line}");
                }
                Some(Err(lagged)) => warn!(error = %lagged, "event stream lagged"),
                None => break,
            }
        }
    }

    fs.stop_watcher().await;
    info!("sandbox-fsd stopped");
    Ok(())
}
