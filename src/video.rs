//! Video sink: packed core pixels to a displayable RGBA image
//!
//! The core reports frames as one `u32` per pixel in `0x00BBGGRR` order. On a
//! little-endian byte view that is R, G, B, 0, so forcing the top byte to
//! `0xFF` yields straight RGBA8888 with an opaque alpha channel.
//!
//! The sink keeps exactly one converted image. A newer frame overwrites it;
//! presenting without a new frame shows the previous image again.

use crate::emulation::CoreError;

/// Frame width in pixels
pub const FRAME_WIDTH: usize = 256;

/// Frame height in pixels
pub const FRAME_HEIGHT: usize = 240;

/// Pixels per frame
pub const FRAME_PIXELS: usize = FRAME_WIDTH * FRAME_HEIGHT;

/// OR-ed into every packed pixel to make it opaque
pub const ALPHA_MASK: u32 = 0xFF00_0000;

/// Display target (canvas, window, test recorder).
pub trait DisplaySurface {
    /// Show an RGBA8888 image of `width` x `height` pixels, row-major.
    fn present(&mut self, rgba: &[u8], width: u32, height: u32);
}

/// Check that a core frame has the expected pixel count.
pub fn check_frame(pixels: &[u32]) -> Result<(), CoreError> {
    if pixels.len() != FRAME_PIXELS {
        return Err(CoreError::Fault(format!(
            "frame has {} pixels, expected {FRAME_PIXELS}",
            pixels.len()
        )));
    }
    Ok(())
}

/// Persistent RGBA conversion buffer.
pub struct VideoSink {
    rgba: Vec<u8>,
    frames_converted: u64,
    fresh: bool,
}

impl VideoSink {
    /// Create a sink holding an opaque black image.
    pub fn new() -> Self {
        let black = ALPHA_MASK.to_le_bytes();
        VideoSink {
            rgba: black.repeat(FRAME_PIXELS),
            frames_converted: 0,
            fresh: false,
        }
    }

    /// Convert a core frame into the cached image.
    ///
    /// A frame of the wrong size is a core fault and leaves the cached image
    /// untouched.
    pub fn convert(&mut self, pixels: &[u32]) -> Result<(), CoreError> {
        check_frame(pixels)?;
        for (dst, &pixel) in self.rgba.chunks_exact_mut(4).zip(pixels) {
            dst.copy_from_slice(&(pixel | ALPHA_MASK).to_le_bytes());
        }
        self.frames_converted += 1;
        self.fresh = true;
        Ok(())
    }

    /// Push the cached image to `surface`.
    ///
    /// Returns whether a frame was converted since the last present.
    pub fn present(&mut self, surface: &mut dyn DisplaySurface) -> bool {
        surface.present(&self.rgba, FRAME_WIDTH as u32, FRAME_HEIGHT as u32);
        std::mem::replace(&mut self.fresh, false)
    }

    /// The cached RGBA image.
    pub fn frame(&self) -> &[u8] {
        &self.rgba
    }

    /// Frames converted since creation.
    pub fn frames_converted(&self) -> u64 {
        self.frames_converted
    }
}

impl Default for VideoSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VideoSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSink")
            .field("frames_converted", &self.frames_converted)
            .field("fresh", &self.fresh)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        images: Vec<Vec<u8>>,
    }

    impl DisplaySurface for Recorder {
        fn present(&mut self, rgba: &[u8], width: u32, height: u32) {
            assert_eq!((width, height), (256, 240));
            self.images.push(rgba.to_vec());
        }
    }

    #[test]
    fn test_initial_image_is_opaque_black() {
        let sink = VideoSink::new();
        assert_eq!(sink.frame().len(), FRAME_PIXELS * 4);
        assert!(sink.frame().chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
        assert_eq!(sink.frames_converted(), 0);
    }

    #[test]
    fn test_pixel_unpacking() {
        let mut sink = VideoSink::new();
        let mut pixels = vec![0u32; FRAME_PIXELS];
        pixels[0] = 0x00332211; // B=0x33 G=0x22 R=0x11
        pixels[1] = 0xAA00_00FF; // garbage in the top byte is overridden
        sink.convert(&pixels).unwrap();

        assert_eq!(&sink.frame()[0..4], &[0x11, 0x22, 0x33, 0xFF]);
        assert_eq!(&sink.frame()[4..8], &[0xFF, 0x00, 0x00, 0xFF]);
        assert_eq!(&sink.frame()[8..12], &[0x00, 0x00, 0x00, 0xFF]);
        assert_eq!(sink.frames_converted(), 1);
    }

    #[test]
    fn test_wrong_size_frame_is_fault() {
        let mut sink = VideoSink::new();
        let err = sink.convert(&[0x00FFFFFF; 100]).unwrap_err();
        assert!(matches!(err, CoreError::Fault(_)));
        assert_eq!(sink.frames_converted(), 0);
        assert_eq!(&sink.frame()[0..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_present_keeps_previous_image() {
        let mut sink = VideoSink::new();
        let mut surface = Recorder::default();

        sink.convert(&vec![0x0000FF00; FRAME_PIXELS]).unwrap();
        assert!(sink.present(&mut surface));
        assert!(!sink.present(&mut surface));

        assert_eq!(surface.images.len(), 2);
        assert_eq!(surface.images[0], surface.images[1]);
        assert_eq!(&surface.images[1][0..4], &[0x00, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn test_newest_frame_wins() {
        let mut sink = VideoSink::new();
        sink.convert(&vec![0x000000FF; FRAME_PIXELS]).unwrap();
        sink.convert(&vec![0x00FF0000; FRAME_PIXELS]).unwrap();
        assert_eq!(&sink.frame()[0..4], &[0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(sink.frames_converted(), 2);
    }
}
