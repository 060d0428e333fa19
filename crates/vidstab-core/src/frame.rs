//! Frame buffer types for decoded video frames in CPU memory.
//!
//! Frames are tightly packed 8-bit images. Every frame source delivers RGB,
//! the tracker works on grayscale, and the encoder consumes RGB again.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VidstabError};

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bits per pixel), the decoder and encoder format
    #[default]
    Rgb8,
    /// 8-bit RGBA (32 bits per pixel)
    Rgba8,
    /// 8-bit grayscale
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
            Self::Gray8 => 1,
        }
    }

    /// Calculate total bytes needed for a frame of this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// Name understood by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgb8 => "rgb24",
            Self::Rgba8 => "rgba",
            Self::Gray8 => "gray",
        }
    }
}

/// A video frame in CPU memory.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Packed pixel rows, no padding
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a black frame with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            format,
            width,
            height,
            data: vec![0u8; format.frame_size(width, height)],
        }
    }

    /// Wrap already decoded pixel data, checking its length.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = format.frame_size(width, height);
        if data.len() != expected {
            return Err(VidstabError::InvalidParameter(format!(
                "{:?} frame {}x{} needs {} bytes, got {}",
                format,
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            data,
        })
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Channels of a single pixel.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.stride() + x as usize * bpp;
        &self.data[start..start + bpp]
    }

    /// View an RGB frame as whole pixels. `None` for other formats or a
    /// buffer that is not a whole number of pixels.
    pub fn rgb_pixels(&self) -> Option<&[[u8; 3]]> {
        match self.format {
            PixelFormat::Rgb8 => bytemuck::try_cast_slice(&self.data).ok(),
            _ => None,
        }
    }

    /// View an RGBA frame as whole pixels.
    pub fn rgba_pixels(&self) -> Option<&[[u8; 4]]> {
        match self.format {
            PixelFormat::Rgba8 => bytemuck::try_cast_slice(&self.data).ok(),
            _ => None,
        }
    }

    /// Check that another frame has the same geometry and format.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Rgb8);
        let colors: [[u8; 3]; 8] = [
            [255, 255, 255], // White
            [255, 255, 0],   // Yellow
            [0, 255, 255],   // Cyan
            [0, 255, 0],     // Green
            [255, 0, 255],   // Magenta
            [255, 0, 0],     // Red
            [0, 0, 255],     // Blue
            [0, 0, 0],       // Black
        ];

        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let i = (x * 3) as usize;
                let bar = (x * 8 / width) as usize;
                row[i..i + 3].copy_from_slice(&colors[bar]);
            }
        }

        frame
    }
}
