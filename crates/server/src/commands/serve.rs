//! Handler for the `serve` command.
//!
//! Reads one JSON request per line from stdin and answers with one JSON line
//! per request on stdout. Requests run concurrently on the blocking pool, so
//! responses can arrive out of order; callers match them by `id`.

use super::orchestrator;
use crate::service::{Envelope, Response, SyncService};
use anyhow::Result;
use hsync_state::load_settings;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Handle the `serve` command.
pub(crate) fn handle_serve_command(project_dir: Option<PathBuf>) -> Result<()> {
    let service = Arc::new(SyncService::new(orchestrator(project_dir)?, load_settings()?));
    let rt = Runtime::new()?;
    info!("hsync service started");
    rt.block_on(serve_lines(service, tokio::io::stdin(), tokio::io::stdout()))?;
    info!("hsync service stopped");
    Ok(())
}

/// Serves requests from `input` until EOF, then waits for in-flight ones.
pub(crate) async fn serve_lines<R, W>(service: Arc<SyncService>, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                let id = serde_json::from_str::<Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                let _ = tx.send(Response::error(id, format!("invalid request: {e}")));
                continue;
            }
        };
        debug!(request = ?envelope.request, "Dispatching request");
        let service = Arc::clone(&service);
        let tx = tx.clone();
        requests.spawn_blocking(move || {
            let _ = tx.send(service.handle(envelope));
        });
    }

    while requests.join_next().await.is_some() {}
    drop(tx);
    writer.await??;
    Ok(())
}
