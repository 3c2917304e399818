use ffmpeg_next::{Dictionary, Rational, format::Pixel, picture};

use crate::{
    error::{ConfigError, EncodeError},
    frame::{Frame, FrameLayout, PLANES},
    hw::{find_encoder, is_hardware},
    packet::Packet,
};

/// One encoder session driven frame by frame.
///
/// Every successful `submit` must be followed by a `drain` that yields the
/// packet for that frame before the next `submit`. Implementations must not
/// reorder frames or hold packets back across calls.
pub trait FrameEncoder: Send {
    fn submit(&mut self, frame: Frame) -> Result<(), EncodeError>;

    /// Returns `None` when the encoder has no packet ready.
    fn drain(&mut self) -> Result<Option<Packet>, EncodeError>;
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub gop: usize,
    // quantizer bounds, inclusive
    pub qmin: u32,
    pub qmax: u32,
    pub max_b_frames: usize,
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub codec: String,
}

impl Settings {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout::new(self.width, self.height)
    }

    /// Session pts increment per frame, in `time_base` units.
    fn pts_step(&self) -> i64 {
        let num = self.time_base.denominator() as i64 * self.frame_rate.denominator() as i64;
        let den = self.time_base.numerator() as i64 * self.frame_rate.numerator() as i64;
        if den > 0 { (num / den).max(1) } else { 1 }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.gop == 0 {
            return Err(ConfigError::InvalidGop(self.gop));
        }
        if self.qmin > self.qmax {
            return Err(ConfigError::InvalidQuality {
                qmin: self.qmin,
                qmax: self.qmax,
            });
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            gop: 3,
            qmin: 20,
            qmax: 35,
            max_b_frames: 0,
            frame_rate: Rational::new(16, 1),
            time_base: Rational::new(1, 16_000),
            codec: "h264_nvenc".to_string(),
        }
    }
}

/// Private options for the encoder. Every encoder gets zero-delay output and
/// forced keyframes promoted to IDR.
fn encoder_options(codec_name: &str, settings: &Settings) -> Dictionary<'static> {
    let mut opts = Dictionary::new();
    opts.set("qmin", &settings.qmin.to_string());
    opts.set("qmax", &settings.qmax.to_string());
    if codec_name.contains("nvenc") {
        opts.set("profile", "high");
        opts.set("preset", "slow");
        opts.set("delay", "0");
        opts.set("forced-idr", "1");
    } else if codec_name == "libx264" {
        opts.set("preset", "ultrafast");
        opts.set("tune", "zerolatency");
        opts.set("forced-idr", "1");
    }
    opts
}

/// FFmpeg encoder session for planar YUV 4:2:0 input.
///
/// The only way to get one is [`Encoder::configure`]; a value of this type is
/// always an opened, configured session.
pub struct Encoder {
    inner: ffmpeg_next::codec::encoder::Video,
    codec_name: String,
    layout: FrameLayout,
    next_pts: i64,
    pts_step: i64,
    last_index: usize,
}

impl Encoder {
    pub fn configure(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let codec = find_encoder(&settings.codec)
            .ok_or_else(|| ConfigError::CodecNotFound(settings.codec.clone()))?;
        let codec_name = codec.name().to_string();
        let open_error = |source| ConfigError::Open {
            codec: codec_name.clone(),
            source,
        };

        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(open_error)?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_gop(settings.gop as u32);
        encoder.set_max_b_frames(settings.max_b_frames);
        encoder.set_frame_rate(Some(settings.frame_rate));
        encoder.set_time_base(settings.time_base);
        encoder.set_flags(ffmpeg_next::codec::flag::Flags::GLOBAL_HEADER);

        let encoder = encoder
            .open_with(encoder_options(&codec_name, settings))
            .map_err(open_error)?;

        log::info!(
            "encoder opened: {} ({}), size: {}, gop: {}, hardware: {}",
            codec_name,
            settings.codec,
            settings.layout(),
            settings.gop,
            is_hardware(&codec_name)
        );

        Ok(Self {
            inner: encoder,
            codec_name,
            layout: settings.layout(),
            next_pts: 0,
            pts_step: settings.pts_step(),
            last_index: 0,
        })
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Copies the tightly packed planes of `frame` into an FFmpeg frame,
    /// honoring the destination line sizes.
    fn to_video_frame(&self, frame: &Frame) -> ffmpeg_next::frame::Video {
        let mut video =
            ffmpeg_next::frame::Video::new(Pixel::YUV420P, self.layout.width, self.layout.height);
        for plane in 0..PLANES {
            let (width, height) = self.layout.plane(plane);
            let src = frame.plane(plane);
            let stride = video.stride(plane);
            let dst = video.data_mut(plane);
            for row in 0..height {
                dst[row * stride..row * stride + width]
                    .copy_from_slice(&src[row * width..(row + 1) * width]);
            }
        }
        video
    }
}

impl FrameEncoder for Encoder {
    fn submit(&mut self, frame: Frame) -> Result<(), EncodeError> {
        if frame.layout() != self.layout {
            return Err(EncodeError::LayoutMismatch {
                index: frame.index(),
                expected: self.layout.to_string(),
                actual: frame.layout().to_string(),
            });
        }

        let mut video = self.to_video_frame(&frame);
        if frame.is_keyframe() {
            video.set_kind(picture::Type::I);
        }
        video.set_pts(Some(self.next_pts));
        self.next_pts += self.pts_step;
        self.last_index = frame.index();

        self.inner
            .send_frame(&video)
            .map_err(|source| EncodeError::Submit {
                index: frame.index(),
                source,
            })
    }

    fn drain(&mut self) -> Result<Option<Packet>, EncodeError> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(Packet::from(packet))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                log::trace!(
                    "{}: no packet after frame {}",
                    self.codec_name,
                    self.last_index
                );
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(EncodeError::Receive(err)),
        }
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
