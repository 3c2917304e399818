/// Registers FFmpeg components. Call once at startup before configuring
/// any encoder session.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod encoder;
pub mod error;
pub mod frame;
pub mod hw;
pub mod packet;
pub mod wire;

pub use ffmpeg_next;

pub use encoder::{Encoder, FrameEncoder, Settings};
pub use error::{ConfigError, EncodeError, WireError};
pub use frame::{Frame, FrameLayout};
pub use packet::{Packet, PacketFlags};
