use std::path::{Path, PathBuf};

use ffmpeg_enc::{FrameLayout, Settings};

/// Frames per batch, and the encoder's group of pictures.
pub const GOP: usize = 3;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_ADDRESS: &str = "/tmp/nvenc.sock";
pub const DEFAULT_CODEC: &str = "h264_nvenc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid video size ({width}x{height})")]
    InvalidSize { width: u32, height: u32 },

    #[error("worker count must be at least 1")]
    NoWorkers,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    width: u32,
    height: u32,
    address: PathBuf,
    workers: usize,
    codec: String,
}

impl ServerConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            address: PathBuf::from(DEFAULT_ADDRESS),
            workers: DEFAULT_WORKERS,
            codec: DEFAULT_CODEC.to_string(),
        }
    }

    pub fn with_address(mut self, address: impl Into<PathBuf>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    pub fn address(&self) -> &Path {
        &self.address
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.width, self.height)
    }

    pub fn encoder_settings(&self) -> Settings {
        Settings {
            gop: GOP,
            codec: self.codec.clone(),
            ..Settings::new(self.width, self.height)
        }
    }

    /// Largest request the transport accepts before dropping the connection.
    /// Bodies between one and two GOPs still reach a worker and get a
    /// protocol error reply.
    pub fn max_request_len(&self) -> usize {
        2 * GOP * self.layout().frame_size()
    }

    /// Bound of the request queue in front of the workers.
    pub fn queue_depth(&self) -> usize {
        self.workers * 2
    }
}
