//! Native messaging
//!
//! Frames are a 32-bit length in native byte order followed by that many
//! bytes of UTF-8 JSON. The same codec serves both ends: [`Host`] answers
//! the extension over stdio, [`ChildTransport`] talks to a host executable
//! the way the browser would.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use zs_core::storage::Origin;
use zs_core::{NativeRequest, NativeTransport, SettingsRepository, Storage, TransportError};

/// Largest message a host may send to the browser.
pub const MAX_TO_BROWSER: usize = 1024 * 1024;

/// Largest message accepted from the browser.
pub const MAX_FROM_BROWSER: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Message of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Framing
// =============================================================================

/// Read one message. `Ok(None)` once the peer has closed the stream.
pub async fn read_message<R>(reader: &mut R, max: usize) -> Result<Option<Value>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(header) as usize;
    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

pub async fn write_message<W>(writer: &mut W, message: &Value, max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > max {
        return Err(FrameError::TooLarge { len: body.len(), max });
    }
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge { len: body.len(), max })?;

    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

// =============================================================================
// Host
// =============================================================================

/// The companion side of the bridge, backed by the settings file.
pub struct Host<S> {
    repository: SettingsRepository<S>,
}

impl<S: Storage> Host<S> {
    pub fn new(repository: SettingsRepository<S>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, request: Value) -> Value {
        let request = match serde_json::from_value::<NativeRequest>(request) {
            Ok(request) => request,
            Err(e) => return json!({"ok": false, "error": format!("Unsupported request: {e}")}),
        };

        match request {
            NativeRequest::GetSettings => {
                let document = self.repository.read_all().await;
                json!({"settings": document.to_value()})
            }
            NativeRequest::SaveSettings { settings } => {
                match self.repository.replace(&settings, Origin::Local).await {
                    Ok(_) => json!({"ok": true}),
                    Err(e) => {
                        log::error!("Failed to save settings: {e}");
                        json!({"ok": false, "error": e.to_string()})
                    }
                }
            }
        }
    }

    /// Answer requests until the browser closes the stream. Returns how
    /// many requests were answered.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<usize, FrameError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut handled = 0;
        while let Some(request) = read_message(reader, MAX_FROM_BROWSER).await? {
            let response = self.handle(request).await;
            write_message(writer, &response, MAX_TO_BROWSER).await?;
            handled += 1;
        }
        log::info!("Browser closed the channel after {handled} request(s)");
        Ok(handled)
    }
}

// =============================================================================
// Child Process Transport
// =============================================================================

/// Spawns the host executable for every request, like the browser's
/// one-shot native messages.
pub struct ChildTransport {
    program: PathBuf,
    args: Vec<String>,
}

impl ChildTransport {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

fn frame_to_transport(e: FrameError) -> TransportError {
    match e {
        FrameError::Io(e) => TransportError::Io(e),
        other => TransportError::Handshake(other.to_string()),
    }
}

impl NativeTransport for ChildTransport {
    async fn exchange(&self, host: &str, request: &NativeRequest) -> Result<Value, TransportError> {
        log::debug!("Spawning {} for host '{host}'", self.program.display());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TransportError::HostNotFound(self.program.display().to_string()),
                _ => TransportError::Io(e),
            })?;

        let request = serde_json::to_value(request).map_err(|e| TransportError::Handshake(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Handshake("host stdin unavailable".to_string()))?;
        write_message(&mut stdin, &request, MAX_FROM_BROWSER)
            .await
            .map_err(frame_to_transport)?;
        drop(stdin);

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Handshake("host stdout unavailable".to_string()))?;
        let response = read_message(&mut stdout, MAX_TO_BROWSER)
            .await
            .map_err(frame_to_transport)?
            .ok_or_else(|| TransportError::Disconnected("host exited without answering".to_string()))?;

        let status = child.wait().await?;
        log::debug!("Host exited with {status}");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use zs_core::{Config, MemoryArea, Schema};

    fn host(area: &MemoryArea) -> Host<zs_core::MemoryStorage> {
        Host::new(SettingsRepository::new(
            area.handle(1),
            Rc::new(Schema::builtin()),
            &Config::default(),
        ))
    }

    #[tokio::test]
    async fn test_frame_layout() {
        let mut out = Vec::new();
        write_message(&mut out, &json!({"type": "getSettings"}), MAX_TO_BROWSER).await.unwrap();

        let body = br#"{"type":"getSettings"}"#;
        assert_eq!(&out[..4], &(body.len() as u32).to_ne_bytes());
        assert_eq!(&out[4..], body);

        let mut reader = &out[..];
        let message = read_message(&mut reader, MAX_FROM_BROWSER).await.unwrap();
        assert_eq!(message, Some(json!({"type": "getSettings"})));
        assert_eq!(read_message(&mut reader, MAX_FROM_BROWSER).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() {
        let mut input = Vec::new();
        input.extend_from_slice(&100u32.to_ne_bytes());
        input.extend_from_slice(&[b' '; 100]);
        let result = read_message(&mut &input[..], 10).await;
        assert!(matches!(result, Err(FrameError::TooLarge { len: 100, max: 10 })));

        let mut out = Vec::new();
        let result = write_message(&mut out, &json!("0123456789"), 4).await;
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error() {
        let mut input = Vec::new();
        input.extend_from_slice(&10u32.to_ne_bytes());
        input.extend_from_slice(b"{}");
        assert!(matches!(
            read_message(&mut &input[..], MAX_FROM_BROWSER).await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_host_get_settings_returns_merged_document() {
        let area = MemoryArea::new("sync");
        let host = host(&area);
        let response = host.handle(json!({"type": "getSettings"})).await;
        assert_eq!(response["settings"]["facebook"]["enabled"], json!(true));
        assert_eq!(response["settings"]["version"], json!(1));
    }

    #[tokio::test]
    async fn test_host_save_settings_normalizes_and_persists() {
        let area = MemoryArea::new("sync");
        let host = host(&area);
        let response = host
            .handle(json!({"type": "saveSettings", "settings": {"reddit": {"enabled": false}, "extra": 1}}))
            .await;
        assert_eq!(response, json!({"ok": true}));

        let stored = area.peek("zeroSixSettings").unwrap();
        assert_eq!(stored["reddit"]["enabled"], json!(false));
        assert_eq!(stored["reddit"]["hideHomeFeed"], json!(true));
        assert!(stored.get("extra").is_none());
    }

    #[tokio::test]
    async fn test_host_reports_failures_in_band() {
        let area = MemoryArea::new("sync");
        let host = host(&area);

        let response = host.handle(json!({"type": "launchRocket"})).await;
        assert_eq!(response["ok"], json!(false));

        area.set_offline(true);
        let response = host.handle(json!({"type": "saveSettings", "settings": {}})).await;
        assert_eq!(response["ok"], json!(false));
    }

    #[tokio::test]
    async fn test_serve_answers_until_eof() {
        let area = MemoryArea::new("sync");
        let host = host(&area);

        let mut input = Vec::new();
        write_message(&mut input, &json!({"type": "saveSettings", "settings": {"youtube": {"hideComments": true}}}), MAX_FROM_BROWSER)
            .await
            .unwrap();
        write_message(&mut input, &json!({"type": "getSettings"}), MAX_FROM_BROWSER).await.unwrap();

        let mut output = Vec::new();
        let handled = host.serve(&mut &input[..], &mut output).await.unwrap();
        assert_eq!(handled, 2);

        let mut reader = &output[..];
        let first = read_message(&mut reader, MAX_TO_BROWSER).await.unwrap().unwrap();
        let second = read_message(&mut reader, MAX_TO_BROWSER).await.unwrap().unwrap();
        assert_eq!(first, json!({"ok": true}));
        assert_eq!(second["settings"]["youtube"]["hideComments"], json!(true));
    }

    #[tokio::test]
    async fn test_missing_host_executable() {
        let transport = ChildTransport::new("/nonexistent/zero-six-host", Vec::new());
        let result = transport.exchange("app.zerosix.host", &NativeRequest::GetSettings).await;
        assert!(matches!(result, Err(TransportError::HostNotFound(_))));
    }
}
