//! The one-line JSON handshake a server sends before a connection turns
//! into a raw byte pipe.

use serde::{Deserialize, Serialize};

use sockwarden_core::error::SockwardenError;

/// Both ends of a tunnel must agree on this exactly.
pub const IPC_VERSION: &str = "sockwarden-tty/1";

/// Upper bound on a handshake line before the peer is considered broken.
pub const MAX_HANDSHAKE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub input: bool,
    pub output: bool,
    #[serde(rename = "colorLevel")]
    pub color_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub ipc_version: String,
    pub capabilities: Capabilities,
}

impl Handshake {
    pub fn current(capabilities: Capabilities) -> Self {
        Self {
            ipc_version: IPC_VERSION.to_string(),
            capabilities,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).unwrap_or_default();
        line.push(b'\n');
        line
    }
}

/// Splits at the first newline: `(handshake line, bytes that followed it)`.
pub fn split_handshake(buffer: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = buffer.iter().position(|byte| *byte == b'\n')?;
    Some((&buffer[..pos], &buffer[pos + 1..]))
}

pub fn parse_handshake(line: &[u8]) -> Result<Handshake, SockwardenError> {
    let handshake: Handshake = serde_json::from_slice(line)
        .map_err(|err| SockwardenError::Protocol(format!("malformed handshake: {err}")))?;
    if handshake.ipc_version != IPC_VERSION {
        return Err(SockwardenError::Protocol(format!(
            "ipc version mismatch: this process speaks {IPC_VERSION}, the terminal owner speaks {}; \
             two incompatible sockwarden versions are nested in this shell",
            handshake.ipc_version
        )));
    }
    Ok(handshake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_wire_shape() {
        let handshake = Handshake::current(Capabilities {
            input: true,
            output: true,
            color_level: 2,
        });
        let line = String::from_utf8(handshake.encode()).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["ipc_version"], IPC_VERSION);
        assert_eq!(value["capabilities"]["colorLevel"], 2);
        assert_eq!(value["capabilities"]["input"], true);
    }

    #[test]
    fn splits_at_first_newline_only() {
        let (line, rest) = split_handshake(b"{\"a\":1}\nyes\nno\n").unwrap();
        assert_eq!(line, b"{\"a\":1}");
        assert_eq!(rest, b"yes\nno\n");
        assert!(split_handshake(b"{\"partial\"").is_none());
    }

    #[test]
    fn version_mismatch_is_a_protocol_error() {
        let line =
            br#"{"ipc_version":"0.9","capabilities":{"input":true,"output":true,"colorLevel":0}}"#;
        let err = parse_handshake(line).unwrap_err();
        assert!(matches!(err, SockwardenError::Protocol(ref msg) if msg.contains("mismatch")));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(parse_handshake(b"hello"), Err(SockwardenError::Protocol(_))));
    }
}
