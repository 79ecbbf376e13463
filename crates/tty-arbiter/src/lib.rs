//! Single-terminal arbitration across a tree of nested sockwarden processes.
//!
//! The outermost process owns the terminal and serves it over a Unix socket
//! whose path is exported in `SOCKWARDEN_TTY_IPC`. Descendants without a
//! terminal of their own tunnel through that socket. Within a process,
//! captures are granted in FIFO order and never overlap.

pub mod color;
pub mod protocol;
mod server;
pub mod session;
pub mod terminal;
mod tunnel;

use std::ops::{Deref, DerefMut};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use sockwarden_core::{env, AbortSignal};

pub use protocol::{Capabilities, Handshake, IPC_VERSION};
pub use session::TtySession;
pub use terminal::StdinPump;

use server::TtyServer;
use tunnel::TunnelClient;

/// Output the host process draws on its own (spinners, progress). Paused
/// while anyone holds the terminal.
pub trait HostOutput: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// Host with nothing to pause.
pub struct QuietHost;

impl HostOutput for QuietHost {
    fn pause(&self) {}
    fn resume(&self) {}
}

pub(crate) struct Paused<'a>(&'a dyn HostOutput);

impl<'a> Paused<'a> {
    pub(crate) fn new(host: &'a dyn HostOutput) -> Self {
        host.pause();
        Self(host)
    }
}

impl Drop for Paused<'_> {
    fn drop(&mut self) {
        self.0.resume();
    }
}

/// Where terminal input comes from.
pub enum TerminalInput {
    /// No interactive input.
    Absent,
    /// The process's stdin.
    Stdin,
    /// A terminal on another descriptor. Read only while the terminal is held.
    Descriptor(RawFd),
    /// Pre-wired chunks, for embedding and tests.
    Channel(mpsc::Receiver<Vec<u8>>),
}

pub(crate) struct TerminalState {
    descriptor: Option<RawFd>,
    input: Option<StdinPump>,
    input_ended: bool,
    color_level: u8,
}

impl TerminalState {
    fn new(input: TerminalInput, color_level: u8) -> Self {
        let (descriptor, input) = match input {
            TerminalInput::Absent => (None, None),
            TerminalInput::Stdin => (Some(libc::STDIN_FILENO), None),
            TerminalInput::Descriptor(fd) => (Some(fd), None),
            TerminalInput::Channel(rx) => (None, Some(StdinPump::from_receiver(rx))),
        };
        Self {
            descriptor,
            input,
            input_ended: false,
            color_level,
        }
    }

    fn has_input(&self) -> bool {
        !self.input_ended && (self.descriptor.is_some() || self.input.is_some())
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        Capabilities {
            input: self.has_input(),
            output: true,
            color_level: self.color_level,
        }
    }

    /// The input, starting a descriptor reader on first use.
    fn input(&mut self) -> Option<&mut StdinPump> {
        if !self.has_input() {
            return None;
        }
        if self.input.is_none() {
            if let Some(fd) = self.descriptor {
                self.input = Some(StdinPump::spawn(fd));
            }
        }
        self.input.as_mut()
    }

    /// Next chunk of terminal input; pends forever when there is none.
    pub(crate) async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        match self.input() {
            Some(pump) => pump.read_chunk().await,
            None => std::future::pending().await,
        }
    }

    pub(crate) fn mark_input_ended(&mut self) {
        self.input_ended = true;
        self.input = None;
    }

    /// Stops reading a descriptor so children that inherit it get the
    /// user's next keystrokes.
    fn release(&mut self) {
        if self.input.as_ref().is_some_and(StdinPump::ended) {
            self.mark_input_ended();
        } else if self.input.as_ref().is_some_and(StdinPump::reads_descriptor) {
            self.input = None;
        }
    }
}

/// Exclusive hold on the terminal. Descriptor input is released on drop,
/// however the holder finishes.
pub(crate) struct TerminalLease<'a>(MutexGuard<'a, TerminalState>);

impl<'a> TerminalLease<'a> {
    pub(crate) async fn acquire(terminal: &'a Mutex<TerminalState>) -> Self {
        Self(terminal.lock().await)
    }
}

impl Deref for TerminalLease<'_> {
    type Target = TerminalState;

    fn deref(&self) -> &TerminalState {
        &self.0
    }
}

impl DerefMut for TerminalLease<'_> {
    fn deref_mut(&mut self) -> &mut TerminalState {
        &mut self.0
    }
}

impl Drop for TerminalLease<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub(crate) struct Shared {
    pub(crate) terminal: Mutex<TerminalState>,
    pub(crate) host: Arc<dyn HostOutput>,
}

pub struct ArbiterOptions {
    /// Directory the standalone socket is created in.
    pub socket_dir: PathBuf,
    pub input: TerminalInput,
    /// Socket of an ancestor that owns the terminal.
    pub tunnel_path: Option<PathBuf>,
    /// Export the socket path so child processes find it.
    pub export_env: bool,
    pub color_level: u8,
    pub host: Arc<dyn HostOutput>,
    pub abort: AbortSignal,
}

impl ArbiterOptions {
    pub fn from_env(host: Arc<dyn HostOutput>, abort: AbortSignal) -> Self {
        let input = if atty::is(atty::Stream::Stdin) {
            TerminalInput::Stdin
        } else {
            TerminalInput::Absent
        };
        Self {
            socket_dir: std::env::temp_dir(),
            input,
            tunnel_path: env::non_empty(env::TTY_IPC).map(PathBuf::from),
            export_env: true,
            color_level: color::detect_color_level(),
            host,
            abort,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Standalone,
    Tunneled(PathBuf),
}

/// A process with its own interactive input owns the terminal; one without
/// tunnels to an ancestor when there is one.
pub fn select_mode(has_input: bool, tunnel_path: Option<PathBuf>) -> Mode {
    match tunnel_path {
        Some(path) if !has_input => Mode::Tunneled(path),
        _ => Mode::Standalone,
    }
}

enum Strategy {
    Standalone(TtyServer),
    Tunneled(TunnelClient),
}

pub struct TtyArbiter {
    shared: Arc<Shared>,
    strategy: Strategy,
    abort: AbortSignal,
}

impl TtyArbiter {
    /// Picks a mode and, when standalone, starts serving the terminal.
    /// Must be called inside a tokio runtime.
    pub fn start(options: ArbiterOptions) -> Result<Self> {
        let has_input = !matches!(options.input, TerminalInput::Absent);
        let mode = select_mode(has_input, options.tunnel_path);
        let shared = Arc::new(Shared {
            terminal: Mutex::new(TerminalState::new(options.input, options.color_level)),
            host: options.host,
        });

        let strategy = match mode {
            Mode::Tunneled(path) => {
                tracing::debug!(socket = %path.display(), "tunneling terminal access");
                Strategy::Tunneled(TunnelClient::new(path))
            }
            Mode::Standalone => {
                let name = format!("sockwarden-tty-{}.sock", uuid::Uuid::new_v4().simple());
                let server = TtyServer::bind(options.socket_dir.join(name), Arc::clone(&shared))?;
                if options.export_env {
                    std::env::set_var(env::TTY_IPC, server.socket_path());
                }
                Strategy::Standalone(server)
            }
        };

        Ok(Self {
            shared,
            strategy,
            abort: options.abort,
        })
    }

    pub fn is_tunneled(&self) -> bool {
        matches!(self.strategy, Strategy::Tunneled(_))
    }

    pub fn socket_path(&self) -> &Path {
        match &self.strategy {
            Strategy::Standalone(server) => server.socket_path(),
            Strategy::Tunneled(client) => client.socket_path(),
        }
    }

    /// Runs `f` with exclusive use of the terminal. Callers are served in
    /// arrival order; the terminal is released when `f` finishes, whether
    /// it succeeded or not.
    pub async fn capture<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'s, 't> FnOnce(&'s mut TtySession<'t>) -> BoxFuture<'s, Result<T>>,
    {
        let mut terminal = TerminalLease::acquire(&self.shared.terminal).await;
        let _paused = Paused::new(self.shared.host.as_ref());

        match &self.strategy {
            Strategy::Standalone(_) => {
                let color_level = terminal.color_level;
                let mut session =
                    TtySession::local(terminal.input(), color_level, self.abort.clone());
                f(&mut session).await
            }
            Strategy::Tunneled(client) => {
                let mut session = client.connect(&self.abort).await?;
                let result = f(&mut session).await;
                let finished = session.finish().await;
                let value = result?;
                finished?;
                Ok(value)
            }
        }
    }

    /// Removes the standalone socket. Safe to call more than once.
    pub fn cleanup(&self) -> Result<()> {
        match &self.strategy {
            Strategy::Standalone(server) => server.shutdown(),
            Strategy::Tunneled(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{UnixListener, UnixStream};

    use sockwarden_core::error::SockwardenError;

    fn options(dir: &Path, input: TerminalInput, tunnel_path: Option<PathBuf>) -> ArbiterOptions {
        ArbiterOptions {
            socket_dir: dir.to_path_buf(),
            input,
            tunnel_path,
            export_env: false,
            color_level: 0,
            host: Arc::new(QuietHost),
            abort: AbortSignal::never(),
        }
    }

    #[test]
    fn mode_selection() {
        let path = PathBuf::from("/tmp/owner.sock");
        assert_eq!(select_mode(true, Some(path.clone())), Mode::Standalone);
        assert_eq!(select_mode(false, None), Mode::Standalone);
        assert_eq!(select_mode(false, Some(path.clone())), Mode::Tunneled(path));
    }

    #[tokio::test]
    async fn captures_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let quiet = options(dir.path(), TerminalInput::Absent, None);
        let arbiter = Arc::new(TtyArbiter::start(quiet).unwrap());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for index in 0..4 {
            let arbiter = Arc::clone(&arbiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                arbiter
                    .capture(move |_tty| {
                        Box::pin(async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(15)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            if index == 1 {
                                anyhow::bail!("callback failure");
                            }
                            Ok(index)
                        })
                    })
                    .await
            }));
        }

        let mut failures = 0;
        for task in tasks {
            if task.await.unwrap().is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        arbiter.cleanup().unwrap();
    }

    #[tokio::test]
    async fn connected_client_holds_the_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let quiet = options(dir.path(), TerminalInput::Absent, None);
        let arbiter = Arc::new(TtyArbiter::start(quiet).unwrap());

        let mut client = UnixStream::connect(arbiter.socket_path()).await.unwrap();
        let mut buf = vec![0u8; 512];
        let n = client.read(&mut buf).await.unwrap();
        let (line, _) = protocol::split_handshake(&buf[..n]).unwrap();
        let handshake = protocol::parse_handshake(line).unwrap();
        assert!(!handshake.capabilities.input);
        assert!(handshake.capabilities.output);

        let captured = Arc::new(AtomicBool::new(false));
        let local = {
            let arbiter = Arc::clone(&arbiter);
            let captured = Arc::clone(&captured);
            tokio::spawn(async move {
                arbiter
                    .capture(move |_tty| {
                        Box::pin(async move {
                            captured.store(true, Ordering::SeqCst);
                            Ok(())
                        })
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!captured.load(Ordering::SeqCst));

        client.shutdown().await.unwrap();
        drop(client);
        local.await.unwrap().unwrap();
        assert!(captured.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tunneled_session_reads_owner_input() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let owner =
            TtyArbiter::start(options(dir.path(), TerminalInput::Channel(rx), None)).unwrap();
        let nested = TtyArbiter::start(options(
            dir.path(),
            TerminalInput::Absent,
            Some(owner.socket_path().to_path_buf()),
        ))
        .unwrap();
        assert!(nested.is_tunneled());
        tx.send(b"yes\n".to_vec()).await.unwrap();

        let answer = nested
            .capture(|tty| {
                Box::pin(async move {
                    assert!(tty.has_input());
                    assert!(tty.is_tty());
                    tty.write_str("proceed? ").await?;
                    tty.read_line().await
                })
            })
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("yes"));
        owner.cleanup().unwrap();
        owner.cleanup().unwrap();
    }

    #[tokio::test]
    async fn mismatched_owner_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old-owner.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let line = br#"{"ipc_version":"sockwarden-tty/0","capabilities":{"input":true,"output":true,"colorLevel":1}}"#;
            stream.write_all(line).await.unwrap();
            stream.write_all(b"\n").await.unwrap();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });

        let nested =
            TtyArbiter::start(options(dir.path(), TerminalInput::Absent, Some(path))).unwrap();
        let err = nested
            .capture(|_tty| Box::pin(async { Ok(()) }))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SockwardenError>(),
            Some(SockwardenError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn local_capture_reads_channel_input() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let arbiter =
            TtyArbiter::start(options(dir.path(), TerminalInput::Channel(rx), None)).unwrap();
        tx.send(b"n\ny\n".to_vec()).await.unwrap();

        let first = arbiter
            .capture(|tty| Box::pin(async move { tty.read_line().await }))
            .await
            .unwrap();
        let second = arbiter
            .capture(|tty| Box::pin(async move { tty.read_line().await }))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("n"));
        assert_eq!(second.as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn child_reads_terminal_after_capture() {
        use std::io::Write as _;
        use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
        use std::process::{Command, Stdio};

        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (read_end, mut writer) = unsafe {
            (
                OwnedFd::from_raw_fd(fds[0]),
                std::fs::File::from(OwnedFd::from_raw_fd(fds[1])),
            )
        };

        let dir = tempfile::tempdir().unwrap();
        let input = TerminalInput::Descriptor(read_end.as_raw_fd());
        let arbiter = TtyArbiter::start(options(dir.path(), input, None)).unwrap();
        writer.write_all(b"y\n").unwrap();
        let answer = arbiter
            .capture(|tty| Box::pin(async move { tty.read_line().await }))
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("y"));

        writer.write_all(b"hello-from-user\n").unwrap();
        let output = Command::new("/bin/sh")
            .args(["-c", r#"read line; echo "child read: [$line]""#])
            .stdin(Stdio::from(read_end.try_clone().unwrap()))
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "child read: [hello-from-user]"
        );
    }

    #[tokio::test]
    async fn abandoned_capture_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let arbiter =
            TtyArbiter::start(options(dir.path(), TerminalInput::Channel(rx), None)).unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            arbiter.capture(|tty| Box::pin(async move { tty.read_line().await })),
        )
        .await;
        assert!(abandoned.is_err());

        tx.send(b"y\n".to_vec()).await.unwrap();
        let answer = arbiter
            .capture(|tty| {
                Box::pin(async move {
                    assert!(tty.has_input());
                    tty.read_line().await
                })
            })
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("y"));
    }
}
