use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Encoder packet flags. Values are FFmpeg's `AV_PKT_FLAG_*` bits so they are
/// forwarded to clients unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const KEY: PacketFlags = PacketFlags(0x0001);
    pub const CORRUPT: PacketFlags = PacketFlags(0x0002);
    pub const DISCARD: PacketFlags = PacketFlags(0x0004);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }
}

/// One compressed packet, owned independently of the FFmpeg packet it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    flags: PacketFlags,
    data: Bytes,
}

impl Packet {
    pub fn new(flags: PacketFlags, data: Bytes) -> Self {
        Self { flags, data }
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl From<ffmpeg_next::codec::packet::Packet> for Packet {
    fn from(packet: ffmpeg_next::codec::packet::Packet) -> Self {
        let data = packet
            .data()
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();
        Self {
            flags: PacketFlags::from_bits(packet.flags().bits() as u32),
            data,
        }
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "Packet flags: {:#x}, size: {}, is_key: {}",
            self.flags.bits(),
            self.size(),
            self.is_key()
        )
    }
}
