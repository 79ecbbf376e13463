//! Tunneled mode: another process owns the terminal; borrow it over its socket.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

use sockwarden_core::error::SockwardenError;
use sockwarden_core::AbortSignal;

use crate::protocol::{parse_handshake, split_handshake, MAX_HANDSHAKE_BYTES};
use crate::session::TtySession;

pub(crate) struct TunnelClient {
    socket_path: PathBuf,
}

impl TunnelClient {
    pub(crate) fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub(crate) fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connects and waits for the owner's handshake, which only arrives
    /// once the owner has handed the terminal to this connection.
    pub(crate) async fn connect(&self, abort: &AbortSignal) -> Result<TtySession<'static>> {
        let stream = abort
            .run(UnixStream::connect(&self.socket_path))
            .await?
            .with_context(|| format!("connect to tty owner at {}", self.socket_path.display()))?;
        let (mut reader, writer) = stream.into_split();

        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        let (line, leftover) = loop {
            if let Some((line, rest)) = split_handshake(&buffer) {
                break (line.to_vec(), rest.to_vec());
            }
            if buffer.len() > MAX_HANDSHAKE_BYTES {
                return Err(SockwardenError::Protocol("handshake line too long".into()).into());
            }
            let n = abort
                .run(reader.read(&mut chunk))
                .await?
                .context("read tty handshake")?;
            if n == 0 {
                let reason = "connection closed before handshake".into();
                return Err(SockwardenError::Protocol(reason).into());
            }
            buffer.extend_from_slice(&chunk[..n]);
        };

        let handshake = parse_handshake(&line)?;
        Ok(TtySession::tunneled(
            reader,
            writer,
            leftover,
            handshake.capabilities,
            abort.clone(),
        ))
    }
}
