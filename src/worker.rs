use std::thread::JoinHandle;

use anyhow::Context;
use bytes::Bytes;
use ffmpeg_enc::{EncodeError, FrameEncoder, FrameLayout, WireError, wire};

use crate::endpoint::{EndpointError, Inbox};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {id}: transport failure")]
    Transport {
        id: usize,
        #[source]
        source: EndpointError,
    },

    #[error("worker {id}: encoder failure")]
    Encoder {
        id: usize,
        #[source]
        source: EncodeError,
    },
}

/// Why a batch produced no reply.
#[derive(Debug)]
enum BatchError {
    /// The request body is malformed. The worker answers with an empty reply.
    Protocol(WireError),
    /// The encoder session is unusable. The worker stops.
    Encoder(EncodeError),
}

impl From<WireError> for BatchError {
    fn from(e: WireError) -> Self {
        BatchError::Protocol(e)
    }
}

impl From<EncodeError> for BatchError {
    fn from(e: EncodeError) -> Self {
        BatchError::Encoder(e)
    }
}

/// Request loop bound to one encoder session. The session is owned by value
/// and never leaves the worker's thread.
pub struct Worker<E> {
    id: usize,
    encoder: E,
    inbox: Inbox,
    layout: FrameLayout,
    gop: usize,
    batches: u64,
}

impl<E: FrameEncoder> Worker<E> {
    pub fn new(id: usize, encoder: E, inbox: Inbox, layout: FrameLayout, gop: usize) -> Self {
        Self {
            id,
            encoder,
            inbox,
            layout,
            gop,
            batches: 0,
        }
    }

    /// Serves requests until the endpoint closes. Returns the number of
    /// batches encoded.
    pub fn run(mut self) -> Result<u64, WorkerError> {
        log::info!("worker {} started", self.id);
        loop {
            let request = match self.inbox.receive() {
                Ok(Some(request)) => request,
                Ok(None) => {
                    log::info!(
                        "worker {}: endpoint closed after {} batches",
                        self.id,
                        self.batches
                    );
                    return Ok(self.batches);
                }
                Err(source) => {
                    return Err(WorkerError::Transport {
                        id: self.id,
                        source,
                    });
                }
            };

            log::trace!("worker {}: request of {} bytes", self.id, request.body().len());
            let (body, responder) = request.into_parts();
            let reply = match self.encode_batch(body) {
                Ok(reply) => reply,
                Err(BatchError::Protocol(e)) => {
                    log::warn!("worker {}: rejecting request: {}", self.id, e);
                    Bytes::new()
                }
                Err(BatchError::Encoder(source)) => {
                    return Err(WorkerError::Encoder {
                        id: self.id,
                        source,
                    });
                }
            };

            if let Err(e) = responder.reply(reply) {
                log::warn!("worker {}: {}", self.id, e);
            }
        }
    }

    /// Decodes, encodes and serializes one batch. Frames and packets are
    /// released before the reply is returned.
    fn encode_batch(&mut self, body: Bytes) -> Result<Bytes, BatchError> {
        let mut frames = wire::decode_batch(body, self.layout, self.gop)?;
        if let Some(first) = frames.first_mut() {
            first.force_keyframe();
        }

        let mut packets = Vec::with_capacity(frames.len());
        for frame in frames {
            let index = frame.index();
            self.encoder.submit(frame)?;
            let packet = self
                .encoder
                .drain()?
                .ok_or(EncodeError::PacketUnavailable { index })?;
            packets.push(packet);
        }

        self.batches += 1;
        log::debug!(
            "worker {}: batch {} encoded, {} packets, {} bytes",
            self.id,
            self.batches,
            packets.len(),
            packets.iter().map(|p| p.size()).sum::<usize>()
        );
        Ok(wire::encode_reply(&packets))
    }
}

/// Fixed set of worker threads sharing one inbox.
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<u64, WorkerError>>>,
}

impl WorkerPool {
    /// Starts one named thread per encoder session.
    pub fn spawn<E>(
        encoders: Vec<E>,
        inbox: Inbox,
        layout: FrameLayout,
        gop: usize,
    ) -> anyhow::Result<Self>
    where
        E: FrameEncoder + 'static,
    {
        let mut handles = Vec::with_capacity(encoders.len());
        for (id, encoder) in encoders.into_iter().enumerate() {
            let worker = Worker::new(id, encoder, inbox.clone(), layout, gop);
            let handle = std::thread::Builder::new()
                .name(format!("encode-worker-{}", id))
                .spawn(move || worker.run())
                .with_context(|| format!("failed to spawn worker {}", id))?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit. Returns how many of them failed.
    pub fn join(self) -> usize {
        let mut failed = 0;
        for handle in self.handles {
            match handle.join() {
                Ok(Ok(batches)) => log::debug!("worker exited cleanly after {} batches", batches),
                Ok(Err(e)) => {
                    log::error!("{:#}", anyhow::Error::from(e));
                    failed += 1;
                }
                Err(_) => {
                    log::error!("worker thread panicked");
                    failed += 1;
                }
            }
        }
        failed
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
