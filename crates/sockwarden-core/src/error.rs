use thiserror::Error;

/// Exit code used when the real tool (or npm's install root) cannot be found.
pub const EXIT_NOT_FOUND: i32 = 127;
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Error)]
pub enum SockwardenError {
    #[error("unable to locate the real `{0}` binary on PATH (only the sockwarden shim was found)")]
    BinaryNotFound(String),
    #[error("unable to locate the npm install root from {0}")]
    NpmRootNotFound(String),
    #[error("tty ipc protocol error: {0}")]
    Protocol(String),
    #[error(
        "unable to reach {host} ({reason}). The Socket API may be unreachable or this machine is offline; \
         check your network connection and any HTTPS_PROXY settings, then retry"
    )]
    Connectivity { host: String, reason: String },
    #[error("scan request failed with status {status}: {body}")]
    ScanStatus { status: u16, body: String },
    #[error("malformed scan data: {0}")]
    Data(String),
    #[error("risky packages need confirmation, but no interactive terminal is available to prompt")]
    CannotPrompt,
    #[error("installation aborted: risks were not accepted")]
    Declined,
    #[error("dependency diff walk exceeded {0} node visits (possible cycle)")]
    WalkLimitExceeded(usize),
    #[error("no Socket API key configured (set SOCKET_SECURITY_API_KEY or [api].api_key)")]
    MissingApiKey,
    #[error("operation aborted")]
    Aborted,
}

impl SockwardenError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SockwardenError::BinaryNotFound(_) | SockwardenError::NpmRootNotFound(_) => {
                EXIT_NOT_FOUND
            }
            _ => EXIT_FAILURE,
        }
    }
}

/// Picks the process exit code for an error chain.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<SockwardenError>())
        .map(SockwardenError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
