//! `Content-Length` framing over a byte stream.
//!
//! Each message is `Content-Length: N\r\n\r\n{json}`. A malformed JSON body
//! leaves the stream aligned on the next frame, so it is reported as a
//! recoverable error; header and IO failures are not.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (16 MiB). Whole-document sync puts full texts on the
/// wire, so this is more generous than a typical RPC limit.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("stream error while {context}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed header: {0}")]
    Header(String),
    #[error("Content-Length {0} exceeds maximum {max}", max = MAX_FRAME_BYTES)]
    TooLarge(usize),
    #[error("frame body is not valid JSON")]
    Json(#[source] serde_json::Error),
}

impl CodecError {
    /// Whether the stream is still positioned at a frame boundary.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}

pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame. `Ok(None)` on EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>, CodecError> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(CodecError::TooLarge(content_length));
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(CodecError::io("reading frame body"))?;

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(CodecError::Json)
    }

    async fn read_headers(&mut self) -> Result<Option<usize>, CodecError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(CodecError::io("reading header line"))?;

            if bytes_read == 0 {
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(CodecError::Header(
                    "unexpected EOF while reading headers".to_string(),
                ));
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(CodecError::Header(format!("no colon in {trimmed:?}")));
            };
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let len = value.trim().parse().map_err(|_| {
                    CodecError::Header(format!("invalid Content-Length {:?}", value.trim()))
                })?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .ok_or_else(|| CodecError::Header("missing Content-Length".to_string()))
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame<T: Serialize>(&mut self, msg: &T) -> Result<(), CodecError> {
        let body = serde_json::to_string(msg).map_err(CodecError::Json)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(CodecError::io("writing frame header"))?;
        self.writer
            .write_all(body.as_bytes())
            .await
            .map_err(CodecError::io("writing frame body"))?;
        self.writer
            .flush()
            .await
            .map_err(CodecError::io("flushing frame"))?;

        Ok(())
    }
}
