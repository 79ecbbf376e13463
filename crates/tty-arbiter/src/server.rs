//! Standalone mode: this process owns the terminal and lends it, one
//! connection at a time, to nested processes over a Unix socket.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::protocol::Handshake;
use crate::{Paused, Shared, TerminalLease};

pub(crate) struct TtyServer {
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
}

impl TtyServer {
    pub(crate) fn bind(socket_path: PathBuf, shared: Arc<Shared>) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create socket dir {}", parent.display()))?;
        }
        if socket_path.exists() {
            fs::remove_file(&socket_path)
                .with_context(|| format!("remove stale socket {}", socket_path.display()))?;
        }
        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("bind socket {}", socket_path.display()))?;
        fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("set socket permissions {}", socket_path.display()))?;
        tracing::debug!(socket = %socket_path.display(), "tty server listening");

        let accept_task = tokio::spawn(accept_loop(listener, shared));
        Ok(Self {
            socket_path,
            accept_task,
        })
    }

    pub(crate) fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stops accepting and removes the socket file. A file that is already
    /// gone is fine; any other removal failure is reported.
    pub(crate) fn shutdown(&self) -> Result<()> {
        self.accept_task.abort();
        remove_socket(&self.socket_path)
    }
}

impl Drop for TtyServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = fs::remove_file(&self.socket_path);
    }
}

pub(crate) fn remove_socket(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove socket {}", path.display())),
    }
}

async fn accept_loop(listener: UnixListener, shared: Arc<Shared>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(err) = check_peer_uid(&stream) {
                        tracing::warn!("rejecting tty client: {err}");
                        continue;
                    }
                    let shared = Arc::clone(&shared);
                    connections.spawn(async move {
                        if let Err(err) = serve_connection(shared, stream).await {
                            tracing::debug!("tty client ended with error: {err:#}");
                        }
                    });
                }
                Err(err) => tracing::warn!("tty server accept failed: {err}"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

/// Holds the terminal for the whole connection: client bytes go to the
/// terminal, terminal input goes to the client, until the client closes.
async fn serve_connection(shared: Arc<Shared>, stream: UnixStream) -> Result<()> {
    let mut terminal = TerminalLease::acquire(&shared.terminal).await;
    let _paused = Paused::new(shared.host.as_ref());

    let (mut reader, mut writer) = stream.into_split();
    let handshake = Handshake::current(terminal.capabilities());
    writer
        .write_all(&handshake.encode())
        .await
        .context("send tty handshake")?;

    let mut stderr = tokio::io::stderr();
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read.context("read from tty client")?;
                if n == 0 {
                    break;
                }
                stderr.write_all(&buf[..n]).await.context("write to terminal")?;
                stderr.flush().await.context("flush terminal")?;
            }
            chunk = terminal.next_chunk() => match chunk {
                Some(bytes) => writer.write_all(&bytes).await.context("forward terminal input")?,
                None => {
                    terminal.mark_input_ended();
                    let _ = writer.shutdown().await;
                }
            },
        }
    }
    Ok(())
}

fn check_peer_uid(stream: &UnixStream) -> Result<()> {
    let fd = stream.as_raw_fd();
    let mut cred: libc::ucred = libc::ucred { pid: 0, uid: 0, gid: 0 };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut libc::ucred as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(anyhow!("failed to read peer credentials"));
    }
    let current = unsafe { libc::geteuid() };
    if cred.uid != current {
        return Err(anyhow!("unauthorized peer uid {}", cred.uid));
    }
    Ok(())
}
