//! Serve loop: framed JSON-RPC over a byte stream, one message at a time.
//!
//! A reader task decodes frames into a bounded queue and a writer task
//! drains the session's outgoing channel. Dispatch happens on the calling
//! task, strictly in arrival order. The loop ends when the session exits,
//! whether by `exit`, end of input, or the watchdog.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::codec::{CodecError, FrameReader, FrameWriter};
use crate::config::SessionConfig;
use crate::project::ProjectFactory;
use crate::protocol::{Message, Response, ResponseError, error_codes};
use crate::session::Session;

const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// How long pending outgoing frames may take to flush after exit.
const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

/// Run a session over `input`/`output` until it exits. Returns the process
/// exit code.
pub async fn serve<R, W>(
    input: R,
    output: W,
    config: SessionConfig,
    factory: Arc<dyn ProjectFactory>,
) -> Result<i32>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Value>();
    let session = Session::new(config, factory, client_tx);

    let writer_handle = tokio::spawn(async move {
        let mut writer = FrameWriter::new(output);
        while let Some(frame) = client_rx.recv().await {
            if let Err(e) = writer.write_frame(&frame).await {
                tracing::warn!("Write error, dropping remaining output: {e}");
                break;
            }
        }
    });

    let (inbound_tx, mut inbound_rx) =
        mpsc::channel::<Result<Value, CodecError>>(INBOUND_CHANNEL_CAPACITY);
    let reader_handle = tokio::spawn(async move {
        let mut reader = FrameReader::new(input);
        loop {
            match reader.read_frame().await {
                Ok(Some(frame)) => {
                    if inbound_tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let fatal = !e.is_recoverable();
                    if inbound_tx.send(Err(e)).await.is_err() || fatal {
                        break;
                    }
                }
            }
        }
    });

    tracing::info!("Session started");
    let mut exited = session.exited();
    loop {
        tokio::select! {
            biased;
            _ = async { exited.wait_for(|done| *done).await.map(|_| ()) } => break,
            inbound = inbound_rx.recv() => match inbound {
                Some(Ok(frame)) => dispatch_frame(&session, frame).await,
                Some(Err(e)) if e.is_recoverable() => {
                    tracing::warn!("Discarding unparsable frame: {e}");
                    session.send_response(&Response::error(
                        None,
                        ResponseError::new(error_codes::PARSE_ERROR, e.to_string()),
                    ));
                }
                Some(Err(e)) => {
                    tracing::error!("Input stream failed: {:#}", anyhow::Error::new(e));
                    session.exit();
                    break;
                }
                None => {
                    tracing::info!("Input closed");
                    session.exit();
                    break;
                }
            },
        }
    }

    reader_handle.abort();
    let exit_code = session.exit_code();
    // Dropping the last session handle closes the outgoing channel.
    drop(session);
    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), writer_handle)
        .await
        .is_err()
    {
        tracing::debug!("Output did not drain in time");
    }

    Ok(exit_code)
}

async fn dispatch_frame(session: &Session, frame: Value) {
    let Some(message) = Message::parse(&frame) else {
        tracing::warn!("Ignoring malformed JSON-RPC frame");
        return;
    };

    match message {
        Message::Request { id, method, params } => {
            tracing::debug!(method = %method, "Request");
            let response = session.handle_request(id, &method, params).await;
            session.send_response(&response);
        }
        Message::Notification { method, params } => {
            tracing::debug!(method = %method, "Notification");
            session.handle_notification(&method, params);
        }
        Message::InvalidRequest { method } => {
            tracing::warn!(method = %method, "Request id is neither an integer nor a string");
            session.send_response(&Response::error(
                None,
                ResponseError::invalid_request(format!(
                    "{method}: request id must be an integer or a string"
                )),
            ));
        }
        Message::Response { id } => {
            tracing::trace!(?id, "Ignoring client response");
        }
    }
}
