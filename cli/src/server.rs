//! Newline-delimited JSON front end for a [`Bridge`].
//!
//! Each input line is one request. Tool calls run concurrently, one task per
//! call; every outgoing line goes through a single writer task so responses
//! never interleave.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use outpost_tools::{Bridge, FileUpdate};
use outpost_types::{RemotePath, ToolDefinition};

const WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request {
    Call {
        id: Value,
        tool: String,
        #[serde(default = "empty_object")]
        input: Value,
    },
    SetOverride {
        path: String,
        content: String,
    },
    ListTools,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Response {
    Result {
        id: Value,
        output: String,
        is_error: bool,
    },
    OverrideSet {
        path: RemotePath,
    },
    Tools {
        tools: Vec<ToolDefinition>,
    },
    FileUpdated {
        path: RemotePath,
        created: bool,
        additions: usize,
        deletions: usize,
    },
    Error {
        message: String,
    },
}

impl From<FileUpdate> for Response {
    fn from(update: FileUpdate) -> Self {
        Response::FileUpdated {
            path: update.path,
            created: update.old_content.is_none(),
            additions: update.additions,
            deletions: update.deletions,
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Response>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("failed to encode response: {e}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            tracing::warn!("output write error: {e}");
            break;
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!("output flush error: {e}");
            break;
        }
    }
}

async fn send(tx: &mpsc::Sender<Response>, response: Response) {
    if tx.send(response).await.is_err() {
        tracing::warn!("output closed; dropping response");
    }
}

async fn next_update(updates: &mut Option<mpsc::Receiver<FileUpdate>>) -> Option<FileUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Serve requests from `reader` until it reaches EOF, then wait for in-flight
/// calls and flush every pending response.
pub async fn serve<R, W>(
    bridge: Arc<Bridge>,
    mut updates: Option<mpsc::Receiver<FileUpdate>>,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Response>(WRITER_CHANNEL_CAPACITY);
    let writer_handle = tokio::spawn(write_responses(writer, rx));
    let mut calls = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&bridge, &tx, &mut calls, &line).await;
            }
            Some(update) = next_update(&mut updates) => {
                send(&tx, update.into()).await;
            }
        }
        while let Some(joined) = calls.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!("tool call task failed: {e}");
            }
        }
    }

    while let Some(joined) = calls.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("tool call task failed: {e}");
        }
    }
    if let Some(rx) = updates.as_mut() {
        while let Ok(update) = rx.try_recv() {
            send(&tx, update.into()).await;
        }
    }

    drop(tx);
    writer_handle.await?;
    Ok(())
}

async fn handle_line(
    bridge: &Arc<Bridge>,
    tx: &mpsc::Sender<Response>,
    calls: &mut JoinSet<()>,
    line: &str,
) {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("malformed request: {e}");
            send(
                tx,
                Response::Error {
                    message: format!("malformed request: {e}"),
                },
            )
            .await;
            return;
        }
    };

    match request {
        Request::Call { id, tool, input } => {
            tracing::debug!(tool = %tool, "dispatching tool call");
            let bridge = Arc::clone(bridge);
            let tx = tx.clone();
            calls.spawn(async move {
                let result = bridge.call(&tool, input).await;
                send(
                    &tx,
                    Response::Result {
                        id,
                        output: result.output,
                        is_error: result.is_error,
                    },
                )
                .await;
            });
        }
        // Handled inline so a following call on the same path sees it.
        Request::SetOverride { path, content } => {
            let path = bridge.set_override(&path, content);
            send(tx, Response::OverrideSet { path }).await;
        }
        Request::ListTools => {
            send(
                tx,
                Response::Tools {
                    tools: bridge.definitions(),
                },
            )
            .await;
        }
    }
}
