//! The real terminal's input, read on a dedicated thread so that the
//! blocking read never parks a runtime worker.
//!
//! The reader only runs while someone holds the terminal. Dropping the pump
//! stops the thread before returning, so a child process that inherits the
//! descriptor afterwards sees every byte the user types next.

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

const CHUNK: usize = 4096;
/// Upper bound on how long a stop request waits for the reader thread.
const POLL_INTERVAL_MS: libc::c_int = 50;

#[derive(Debug)]
struct Reader {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Chunks of terminal input, delivered in order. `None` from a read means
/// the input ended.
#[derive(Debug)]
pub struct StdinPump {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    ended: bool,
    reader: Option<Reader>,
}

impl StdinPump {
    /// Starts reading `fd`. Bytes the pump has read are no longer visible
    /// to child processes, so keep it alive only while prompting.
    pub fn spawn(fd: RawFd) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("sockwarden-stdin".into())
                .spawn(move || read_descriptor(fd, &stop, &tx))
        };
        let reader = match thread {
            Ok(thread) => Some(Reader { stop, thread }),
            Err(err) => {
                tracing::warn!("failed to start stdin reader: {err}");
                None
            }
        };
        Self {
            rx,
            pending: Vec::new(),
            ended: false,
            reader,
        }
    }

    pub fn from_receiver(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            ended: false,
            reader: None,
        }
    }

    /// Whether this pump reads a descriptor rather than a channel.
    pub fn reads_descriptor(&self) -> bool {
        self.reader.is_some()
    }

    /// Whether a read has already observed the end of input.
    pub fn ended(&self) -> bool {
        self.ended && self.pending.is_empty()
    }

    async fn recv(&mut self) -> Option<Vec<u8>> {
        let chunk = self.rx.recv().await;
        if chunk.is_none() {
            self.ended = true;
        }
        chunk
    }

    /// Next chunk of raw input. Cancel safe.
    pub async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        if !self.pending.is_empty() {
            return Some(std::mem::take(&mut self.pending));
        }
        self.recv().await
    }

    /// Next line without its terminator; a trailing unterminated line is
    /// returned at end of input.
    pub async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = take_line(&mut self.pending) {
                return Some(line);
            }
            match self.recv().await {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None if self.pending.is_empty() => return None,
                None => {
                    let rest = std::mem::take(&mut self.pending);
                    return Some(String::from_utf8_lossy(&rest).into_owned());
                }
            }
        }
    }
}

impl Drop for StdinPump {
    /// Blocks for at most one poll interval.
    fn drop(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        reader.stop.store(true, Ordering::SeqCst);
        // Unblocks a reader waiting for channel capacity.
        self.rx.close();
        if reader.thread.join().is_err() {
            tracing::warn!("stdin reader thread panicked");
        }
        if !self.pending.is_empty() {
            tracing::debug!(bytes = self.pending.len(), "discarding unread terminal input");
        }
    }
}

/// Reads `fd` until it ends or `stop` is set. `read` is only called once
/// `poll` reports data, so the stop flag is seen within one interval.
fn read_descriptor(fd: RawFd, stop: &AtomicBool, tx: &mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK];
    while !stop.load(Ordering::SeqCst) {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_INTERVAL_MS) };
        if ready < 0 {
            if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }
        if ready == 0 || stop.load(Ordering::SeqCst) {
            continue;
        }
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len()) };
        if n < 0 {
            if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break;
        }
        if n == 0 {
            break;
        }
        if tx.blocking_send(buf[..n as usize].to_vec()).is_err() {
            break;
        }
    }
}

/// Removes one `\n`-terminated line from the front of `buffer`.
pub(crate) fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.iter().position(|byte| *byte == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=pos).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    #[tokio::test]
    async fn reads_lines_across_chunks() {
        let (tx, rx) = mpsc::channel(4);
        let mut pump = StdinPump::from_receiver(rx);
        tx.send(b"ye".to_vec()).await.unwrap();
        tx.send(b"s\r\nno\nrest".to_vec()).await.unwrap();
        drop(tx);
        assert_eq!(pump.read_line().await.as_deref(), Some("yes"));
        assert_eq!(pump.read_line().await.as_deref(), Some("no"));
        assert_eq!(pump.read_line().await.as_deref(), Some("rest"));
        assert_eq!(pump.read_line().await, None);
        assert!(pump.ended());
    }

    #[tokio::test]
    async fn chunk_reads_drain_pending_first() {
        let (tx, rx) = mpsc::channel(4);
        let mut pump = StdinPump::from_receiver(rx);
        tx.send(b"a\nb".to_vec()).await.unwrap();
        assert_eq!(pump.read_line().await.as_deref(), Some("a"));
        assert_eq!(pump.read_chunk().await, Some(b"b".to_vec()));
    }

    fn pipe() -> (OwnedFd, std::fs::File) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), std::fs::File::from(OwnedFd::from_raw_fd(fds[1]))) }
    }

    #[tokio::test]
    async fn dropping_the_pump_leaves_later_input_unread() {
        let (read_end, mut writer) = pipe();
        let mut pump = StdinPump::spawn(read_end.as_raw_fd());
        assert!(pump.reads_descriptor());
        writer.write_all(b"first\n").unwrap();
        assert_eq!(pump.read_line().await.as_deref(), Some("first"));
        drop(pump);

        writer.write_all(b"second\n").unwrap();
        let mut reader = std::fs::File::from(read_end);
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second\n");
    }

    #[tokio::test]
    async fn descriptor_end_is_reported() {
        let (read_end, writer) = pipe();
        let mut pump = StdinPump::spawn(read_end.as_raw_fd());
        drop(writer);
        assert_eq!(pump.read_chunk().await, None);
        assert!(pump.ended());
    }
}
