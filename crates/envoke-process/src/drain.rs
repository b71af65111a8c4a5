//! Background pipe drain: copies child output into a capture buffer and an
//! optional line-forwarder.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use owo_colors::OwoColorize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const READ_CHUNK: usize = 4096;
/// How long the post-stop residual drain waits for one more chunk.
const RESIDUAL_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Destination for forwarded output segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardTo {
    /// Capture only.
    Null,
    Stdout,
    /// The user's stderr, red-tinted when `red` is set.
    Stderr { red: bool },
}

/// A worker draining one child pipe.
///
/// Bytes land in the capture buffer in arrival order. When forwarding is
/// enabled, newline-terminated segments are written to the destination as
/// they complete; a trailing partial line is flushed when the drain ends.
pub struct StreamDrain {
    buffer: Arc<Mutex<Vec<u8>>>,
    stop: Option<oneshot::Sender<()>>,
    worker: JoinHandle<()>,
}

impl StreamDrain {
    /// Spawn a drain over one child pipe. With `on_exit_drain`, residual
    /// bytes are pulled after the stop signal before the worker exits.
    pub fn spawn<R>(reader: R, forward: ForwardTo, on_exit_drain: bool) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(drain_loop(
            reader,
            Arc::clone(&buffer),
            forward,
            stop_rx,
            on_exit_drain,
        ));
        Self {
            buffer,
            stop: Some(stop_tx),
            worker,
        }
    }

    /// Signal stop, join the worker, and take the captured bytes.
    pub async fn shutdown(mut self) -> Vec<u8> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.worker).await;
        let mut buffer = self.buffer.lock().expect("drain buffer lock");
        std::mem::take(&mut *buffer)
    }
}

async fn drain_loop<R>(
    mut reader: R,
    buffer: Arc<Mutex<Vec<u8>>>,
    forward: ForwardTo,
    mut stop_rx: oneshot::Receiver<()>,
    on_exit_drain: bool,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    let mut line_buf: Vec<u8> = Vec::new();
    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => consume(&chunk[..n], &buffer, forward, &mut line_buf),
            },
            _ = &mut stop_rx => {
                if on_exit_drain {
                    residual_drain(&mut reader, &buffer, forward, &mut line_buf).await;
                }
                break;
            }
        }
    }
    flush_partial(&mut line_buf, forward);
}

/// Pull whatever is still buffered in the pipe, bounded per read so a child
/// that stopped writing cannot stall teardown.
async fn residual_drain<R>(
    reader: &mut R,
    buffer: &Arc<Mutex<Vec<u8>>>,
    forward: ForwardTo,
    line_buf: &mut Vec<u8>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match tokio::time::timeout(RESIDUAL_READ_TIMEOUT, reader.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => consume(&chunk[..n], buffer, forward, line_buf),
        }
    }
}

fn consume(bytes: &[u8], buffer: &Arc<Mutex<Vec<u8>>>, forward: ForwardTo, line_buf: &mut Vec<u8>) {
    buffer
        .lock()
        .expect("drain buffer lock")
        .extend_from_slice(bytes);
    if forward == ForwardTo::Null {
        return;
    }
    line_buf.extend_from_slice(bytes);
    while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
        let segment: Vec<u8> = line_buf.drain(..=pos).collect();
        write_segment(forward, &segment);
    }
}

fn flush_partial(line_buf: &mut Vec<u8>, forward: ForwardTo) {
    if !line_buf.is_empty() && forward != ForwardTo::Null {
        write_segment(forward, line_buf);
    }
    line_buf.clear();
}

fn write_segment(forward: ForwardTo, bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    match forward {
        ForwardTo::Null => {}
        ForwardTo::Stdout => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        ForwardTo::Stderr { red: false } => eprint!("{text}"),
        ForwardTo::Stderr { red: true } => eprint!("{}", text.red()),
    }
}
