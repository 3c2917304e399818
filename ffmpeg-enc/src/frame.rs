use std::fmt::{Display, Formatter};

use bytes::Bytes;

/// Number of planes in the planar YUV 4:2:0 layout.
pub const PLANES: usize = 3;

/// Geometry of one raw planar YUV 4:2:0 frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
}

impl FrameLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// `(width, height)` of plane `index` (0 = Y, 1 = U, 2 = V).
    pub fn plane(&self, index: usize) -> (usize, usize) {
        match index {
            0 => (self.width as usize, self.height as usize),
            _ => (self.chroma_width() as usize, self.chroma_height() as usize),
        }
    }

    /// Tightly packed payload size of one frame, same as
    /// `av_image_get_buffer_size(YUV420P, w, h, 1)`.
    pub fn frame_size(&self) -> usize {
        let luma = self.width as usize * self.height as usize;
        let chroma = self.chroma_width() as usize * self.chroma_height() as usize;
        luma + 2 * chroma
    }

    fn plane_offset(&self, index: usize) -> usize {
        (0..index)
            .map(|i| {
                let (w, h) = self.plane(i);
                w * h
            })
            .sum()
    }
}

impl Display for FrameLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One decoded raw frame of a batch. `data` is a zero-copy view into the
/// request buffer it was cut from.
#[derive(Debug, Clone)]
pub struct Frame {
    index: usize,
    layout: FrameLayout,
    keyframe: bool,
    data: Bytes,
}

impl Frame {
    pub fn new(index: usize, layout: FrameLayout, data: Bytes) -> Self {
        Self {
            index,
            layout,
            keyframe: false,
            data,
        }
    }

    /// Position of the frame within its batch.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn is_keyframe(&self) -> bool {
        self.keyframe
    }

    /// Overrides the picture type hint so the encoder emits an IDR picture.
    pub fn force_keyframe(&mut self) {
        self.keyframe = true;
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Tightly packed rows of plane `index`.
    pub fn plane(&self, index: usize) -> &[u8] {
        let (w, h) = self.layout.plane(index);
        let start = self.layout.plane_offset(index);
        &self.data[start..start + w * h]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_even() {
        let layout = FrameLayout::new(64, 64);
        assert_eq!(layout.frame_size(), 6144);
        assert_eq!(layout.frame_size(), 64 * 64 * 3 / 2);

        let layout = FrameLayout::new(1920, 1080);
        assert_eq!(layout.frame_size(), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn test_frame_size_odd_rounds_chroma_up() {
        let layout = FrameLayout::new(5, 3);
        assert_eq!(layout.plane(0), (5, 3));
        assert_eq!(layout.plane(1), (3, 2));
        assert_eq!(layout.plane(2), (3, 2));
        assert_eq!(layout.frame_size(), 15 + 6 + 6);
    }

    #[test]
    fn test_planes_split_payload() {
        let layout = FrameLayout::new(4, 2);
        // Y: 8 bytes, U: 2 bytes, V: 2 bytes
        let data: Vec<u8> = (0..12).collect();
        let frame = Frame::new(0, layout, Bytes::from(data));
        assert_eq!(frame.plane(0), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frame.plane(1), &[8, 9]);
        assert_eq!(frame.plane(2), &[10, 11]);
    }

    #[test]
    fn test_force_keyframe() {
        let mut frame = Frame::new(1, FrameLayout::new(2, 2), Bytes::from_static(&[0; 6]));
        assert!(!frame.is_keyframe());
        frame.force_keyframe();
        assert!(frame.is_keyframe());
        assert_eq!(frame.index(), 1);
    }
}
