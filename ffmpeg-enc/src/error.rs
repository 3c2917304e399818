//! Error types for the encoder adapter and the wire codec.
//!
//! - [`ConfigError`]: an encoder session could not be created. Fatal at startup.
//! - [`WireError`]: a request or reply body does not follow the batch layout.
//! - [`EncodeError`]: the encoder rejected a frame or produced no packet. The
//!   session state is undefined afterwards, so callers must not retry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid video size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("invalid group of pictures size {0}")]
    InvalidGop(usize),

    #[error("invalid quantizer range {qmin}..={qmax}")]
    InvalidQuality { qmin: u32, qmax: u32 },

    #[error("encoder not found: {0}")]
    CodecNotFound(String),

    #[error("failed to open encoder {codec}")]
    Open {
        codec: String,
        #[source]
        source: ffmpeg_next::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("empty request")]
    Empty,

    #[error("request length {len} is not a multiple of the frame size {frame_size}")]
    LengthMismatch { len: usize, frame_size: usize },

    #[error("request carries {frames} frames, at most {gop} allowed")]
    TooManyFrames { frames: usize, gop: usize },

    #[error("truncated packet record at offset {offset}")]
    TruncatedRecord { offset: usize },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame {index} is {actual}, session is configured for {expected}")]
    LayoutMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("encoder rejected frame {index}")]
    Submit {
        index: usize,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("failed to receive packet")]
    Receive(#[source] ffmpeg_next::Error),

    #[error("no packet available after frame {index}")]
    PacketUnavailable { index: usize },
}
