//! Dispatch endpoint: one local socket shared by every worker.
//!
//! ```text
//!  client ──► [conn task] ─┐                         ┌─► worker 0 ─┐
//!  client ──► [conn task] ─┼─► bounded request queue ─┼─► worker 1 ─┼─► oneshot reply ─► conn task
//!  client ──► [conn task] ─┘                         └─► worker N ─┘
//! ```
//!
//! Each connection behaves like a REQ socket: it reads one request, waits for
//! the reply and only then reads the next one. Bodies travel inside a 4-byte
//! big-endian length envelope; the envelope is not part of the body format.
//!
//! Workers share one [`Inbox`]. The receiver sits behind a mutex, so exactly
//! one idle worker waits on the queue at a time and requests are handed out
//! in arrival order. Closing the endpoint stops the acceptor and every
//! connection task; once they are gone all [`Dispatcher`] handles are dropped
//! and `Inbox::receive` reports the closed state.

use std::{
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::{UnixListener, UnixStream},
    sync::{mpsc, oneshot},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
    sync::CancellationToken,
    task::TaskTracker,
};

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("failed to bind {}", .path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("endpoint closed")]
    Closed,

    #[error("client went away before the reply was sent")]
    ReplyDropped,

    #[error("request queue lock poisoned")]
    Poisoned,
}

/// One client request together with the route back to its connection.
pub struct Request {
    body: Bytes,
    responder: Responder,
}

impl Request {
    pub fn new(body: Bytes) -> (Self, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                body,
                responder: Responder { tx },
            },
            rx,
        )
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_parts(self) -> (Bytes, Responder) {
        (self.body, self.responder)
    }
}

pub struct Responder {
    tx: oneshot::Sender<Bytes>,
}

impl Responder {
    pub fn reply(self, body: Bytes) -> Result<(), EndpointError> {
        self.tx.send(body).map_err(|_| EndpointError::ReplyDropped)
    }
}

/// Creates the bounded queue between connection tasks and workers.
pub fn channel(capacity: usize) -> (Dispatcher, Inbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Dispatcher { tx },
        Inbox {
            queue: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side of the request queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Request>,
}

impl Dispatcher {
    /// Queues `body` for the next free worker and returns the pending reply.
    pub async fn dispatch(
        &self,
        body: Bytes,
    ) -> Result<oneshot::Receiver<Bytes>, EndpointError> {
        let (request, pending) = Request::new(body);
        self.tx
            .send(request)
            .await
            .map_err(|_| EndpointError::Closed)?;
        Ok(pending)
    }
}

/// Worker side of the request queue.
#[derive(Clone)]
pub struct Inbox {
    queue: Arc<Mutex<mpsc::Receiver<Request>>>,
}

impl Inbox {
    /// Blocks the calling thread until a request arrives. Returns `Ok(None)`
    /// once the endpoint is closed and the queue is drained.
    ///
    /// Must not be called from inside the async runtime.
    pub fn receive(&self) -> Result<Option<Request>, EndpointError> {
        let mut queue = self.queue.lock().map_err(|_| EndpointError::Poisoned)?;
        Ok(queue.blocking_recv())
    }
}

pub struct Endpoint {
    path: PathBuf,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Endpoint {
    /// Binds a Unix socket at `path` and starts accepting clients. Requests
    /// longer than `max_request_len` close the offending connection.
    pub fn bind(
        path: impl AsRef<Path>,
        max_request_len: usize,
        dispatcher: Dispatcher,
    ) -> Result<Self, EndpointError> {
        let path = path.as_ref().to_path_buf();
        remove_stale_socket(&path);

        let listener = UnixListener::bind(&path).map_err(|source| EndpointError::Bind {
            path: path.clone(),
            source,
        })?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            listener,
            dispatcher,
            max_request_len,
            cancel.clone(),
            tracker.clone(),
        ));

        log::info!("endpoint listening on {}", path.display());
        Ok(Self {
            path,
            cancel,
            tracker,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops accepting and drops every connection.
    pub fn close(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Waits until the acceptor and all connection tasks are gone, then
    /// removes the socket file.
    pub async fn closed(&self) {
        self.tracker.wait().await;
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::debug!("remove {}: {}", self.path.display(), e);
        }
        log::info!("endpoint closed: {}", self.path.display());
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Removes a socket file left behind by a previous run. Other file types are
/// left alone and make the bind fail.
fn remove_stale_socket(path: &Path) {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if meta.file_type().is_socket() {
            log::info!("removing stale socket {}", path.display());
            if let Err(e) = std::fs::remove_file(path) {
                log::debug!("remove {}: {}", path.display(), e);
            }
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    dispatcher: Dispatcher,
    max_request_len: usize,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let mut next_id: u64 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    next_id += 1;
                    log::debug!("client {} connected", next_id);
                    tracker.spawn(serve_connection(
                        next_id,
                        stream,
                        dispatcher.clone(),
                        max_request_len,
                        cancel.clone(),
                    ));
                }
                Err(e) => {
                    log::warn!("accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
    log::debug!("acceptor stopped");
}

async fn serve_connection(
    id: u64,
    stream: UnixStream,
    dispatcher: Dispatcher,
    max_request_len: usize,
    cancel: CancellationToken,
) {
    // Requests are bounded, replies are not.
    let (read, write) = stream.into_split();
    let mut requests = FramedRead::new(
        read,
        LengthDelimitedCodec::builder()
            .max_frame_length(max_request_len)
            .new_codec(),
    );
    let mut replies = FramedWrite::new(
        write,
        LengthDelimitedCodec::builder()
            .max_frame_length(u32::MAX as usize)
            .new_codec(),
    );

    loop {
        let body = tokio::select! {
            _ = cancel.cancelled() => break,
            next = requests.next() => match next {
                Some(Ok(body)) => body.freeze(),
                Some(Err(e)) => {
                    log::warn!("client {}: bad request envelope: {}", id, e);
                    break;
                }
                None => break,
            },
        };

        let pending = tokio::select! {
            _ = cancel.cancelled() => break,
            pending = dispatcher.dispatch(body) => match pending {
                Ok(pending) => pending,
                Err(e) => {
                    log::debug!("client {}: {}", id, e);
                    break;
                }
            },
        };

        let reply = tokio::select! {
            _ = cancel.cancelled() => break,
            reply = pending => match reply {
                Ok(reply) => reply,
                Err(_) => {
                    log::warn!("client {}: request dropped by worker", id);
                    break;
                }
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = replies.send(reply) => if let Err(e) = sent {
                log::warn!("client {}: send reply: {}", id, e);
                break;
            },
        }
    }
    log::debug!("client {} disconnected", id);
}

#[cfg(test)]
#[path = "endpoint_test.rs"]
mod endpoint_test;
