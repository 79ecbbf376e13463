//! What a capture callback gets to talk to: either the local terminal or
//! a tunnel to the process that owns it. Both look like a terminal.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use sockwarden_core::AbortSignal;

use crate::protocol::Capabilities;
use crate::terminal::{take_line, StdinPump};

enum SessionInput<'t> {
    None,
    Terminal(&'t mut StdinPump),
    Tunnel {
        reader: OwnedReadHalf,
        pending: Vec<u8>,
    },
}

enum SessionOutput {
    Stderr(tokio::io::Stderr),
    Tunnel(OwnedWriteHalf),
    Discard,
}

/// Local sessions borrow the owner's input for `'t`; tunneled ones own
/// their connection and are `'static`.
pub struct TtySession<'t> {
    input: SessionInput<'t>,
    output: SessionOutput,
    capabilities: Capabilities,
    is_tty: bool,
    abort: AbortSignal,
}

impl<'t> TtySession<'t> {
    pub(crate) fn local(
        input: Option<&'t mut StdinPump>,
        color_level: u8,
        abort: AbortSignal,
    ) -> Self {
        let capabilities = Capabilities {
            input: input.is_some(),
            output: true,
            color_level,
        };
        Self {
            input: input.map(SessionInput::Terminal).unwrap_or(SessionInput::None),
            output: SessionOutput::Stderr(tokio::io::stderr()),
            capabilities,
            is_tty: atty::is(atty::Stream::Stderr),
            abort,
        }
    }

    /// `leftover` holds any bytes that arrived behind the handshake line.
    pub(crate) fn tunneled(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        leftover: Vec<u8>,
        capabilities: Capabilities,
        abort: AbortSignal,
    ) -> Self {
        let input = if capabilities.input {
            SessionInput::Tunnel {
                reader,
                pending: leftover,
            }
        } else {
            SessionInput::None
        };
        let output = if capabilities.output {
            SessionOutput::Tunnel(writer)
        } else {
            SessionOutput::Discard
        };
        Self {
            input,
            output,
            capabilities,
            // The far end is a terminal; present it as one.
            is_tty: true,
            abort,
        }
    }

    pub fn has_input(&self) -> bool {
        !matches!(self.input, SessionInput::None)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn color_level(&self) -> u8 {
        self.capabilities.color_level
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub async fn write_str(&mut self, text: &str) -> Result<()> {
        match &mut self.output {
            SessionOutput::Stderr(stderr) => {
                stderr.write_all(text.as_bytes()).await.context("write to terminal")?;
                stderr.flush().await.context("flush terminal")?;
            }
            SessionOutput::Tunnel(writer) => {
                writer.write_all(text.as_bytes()).await.context("write to tty tunnel")?;
            }
            SessionOutput::Discard => {}
        }
        Ok(())
    }

    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        self.write_str(text).await?;
        self.write_str("\n").await
    }

    /// Moves the cursor to a zero-based column on the current line.
    pub async fn cursor_to(&mut self, column: u16) -> Result<()> {
        self.write_str(&format!("\x1b[{}G", column + 1)).await
    }

    pub async fn clear_line(&mut self) -> Result<()> {
        self.write_str("\r\x1b[2K").await
    }

    /// Reads one line of user input. `Ok(None)` means input ended or was
    /// never available; an abort surfaces as an error.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let abort = self.abort.clone();
        let line = match &mut self.input {
            SessionInput::None => return Ok(None),
            SessionInput::Terminal(pump) => abort.run(pump.read_line()).await?,
            SessionInput::Tunnel { reader, pending } => {
                abort.run(read_tunnel_line(reader, pending)).await??
            }
        };
        if line.is_none() && matches!(self.input, SessionInput::Tunnel { .. }) {
            self.input = SessionInput::None;
        }
        Ok(line)
    }

    /// Signals end of input to the terminal owner.
    pub(crate) async fn finish(mut self) -> Result<()> {
        if let SessionOutput::Tunnel(writer) = &mut self.output {
            writer.shutdown().await.context("close tty tunnel")?;
        }
        Ok(())
    }
}

async fn read_tunnel_line(
    reader: &mut OwnedReadHalf,
    pending: &mut Vec<u8>,
) -> Result<Option<String>> {
    let mut buf = [0u8; 1024];
    loop {
        if let Some(line) = take_line(pending) {
            return Ok(Some(line));
        }
        let n = reader.read(&mut buf).await.context("read from tty tunnel")?;
        if n == 0 {
            if pending.is_empty() {
                return Ok(None);
            }
            let rest = std::mem::take(pending);
            return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
        }
        pending.extend_from_slice(&buf[..n]);
    }
}
