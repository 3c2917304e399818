//! Helpers shared by the server tests: an in-memory encoder session and a
//! client speaking the endpoint's framing.

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use ffmpeg_enc::{
    EncodeError, Frame, FrameEncoder, FrameLayout, Packet, PacketFlags, ffmpeg_next, wire,
};
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// `drain` returns nothing, as a session holding frames back would.
    Stall,
    /// `submit` fails.
    Reject,
}

/// What the fake saw for every submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub seed: u8,
    pub index: usize,
    pub forced_key: bool,
}

/// One-in-one-out encoder. Each packet starts with `[seed, index]` where
/// `seed` is the first byte of the frame, so tests can match packets to frames.
pub struct FakeEncoder {
    gop: usize,
    packet_size: usize,
    frames: usize,
    pending: VecDeque<Packet>,
    failure: Option<(usize, Failure)>,
    log: Arc<Mutex<Vec<Submitted>>>,
}

impl FakeEncoder {
    pub fn new(gop: usize) -> Self {
        Self {
            gop,
            packet_size: 2,
            frames: 0,
            pending: VecDeque::new(),
            failure: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails the frame after `frames` successful ones.
    pub fn fail_after(mut self, frames: usize, failure: Failure) -> Self {
        self.failure = Some((frames, failure));
        self
    }

    /// Pads every packet with zeros up to `size` bytes.
    pub fn with_packet_size(mut self, size: usize) -> Self {
        self.packet_size = size.max(2);
        self
    }

    pub fn log(&self) -> Arc<Mutex<Vec<Submitted>>> {
        self.log.clone()
    }

    fn failing(&self, failure: Failure) -> bool {
        self.failure == Some((self.frames, failure))
    }
}

impl FrameEncoder for FakeEncoder {
    fn submit(&mut self, frame: Frame) -> Result<(), EncodeError> {
        if self.failing(Failure::Reject) {
            return Err(EncodeError::Submit {
                index: frame.index(),
                source: ffmpeg_next::Error::Bug,
            });
        }

        let seed = frame.data().first().copied().unwrap_or_default();
        self.log.lock().unwrap().push(Submitted {
            seed,
            index: frame.index(),
            forced_key: frame.is_keyframe(),
        });

        let mut flags = PacketFlags::default();
        if frame.is_keyframe() || self.frames % self.gop == 0 {
            flags.insert(PacketFlags::KEY);
        }
        let stalled = self.failing(Failure::Stall);
        self.frames += 1;
        if !stalled {
            let mut data = vec![0u8; self.packet_size];
            data[0] = seed;
            data[1] = frame.index() as u8;
            self.pending.push_back(Packet::new(flags, Bytes::from(data)));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<Option<Packet>, EncodeError> {
        Ok(self.pending.pop_front())
    }
}

/// Request body of `seeds.len()` frames, each filled with its seed byte.
pub fn fill_batch(layout: FrameLayout, seeds: &[u8]) -> Bytes {
    let frames: Vec<Vec<u8>> = seeds
        .iter()
        .map(|&seed| vec![seed; layout.frame_size()])
        .collect();
    let refs: Vec<&[u8]> = frames.iter().map(|f| f.as_slice()).collect();
    wire::encode_batch(&refs)
}

pub struct TestClient {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
}

impl TestClient {
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            framed: Framed::new(
                stream,
                LengthDelimitedCodec::builder()
                    .max_frame_length(u32::MAX as usize)
                    .new_codec(),
            ),
        })
    }

    /// Sends one request without reading the reply.
    pub async fn send(&mut self, body: Bytes) -> anyhow::Result<()> {
        self.framed.send(body).await?;
        Ok(())
    }

    /// Sends one request and waits for its reply. `None` means the server
    /// closed the connection.
    pub async fn request(&mut self, body: Bytes) -> anyhow::Result<Option<Bytes>> {
        self.framed.send(body).await?;
        match self.framed.next().await {
            Some(reply) => Ok(Some(reply?.freeze())),
            None => Ok(None),
        }
    }
}
