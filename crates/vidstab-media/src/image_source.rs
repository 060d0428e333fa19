//! Still images presented as a video.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vidstab_core::{FrameBuffer, FrameRate, PixelFormat, Result, VidstabError};

use crate::source::{source_name, FrameSource, FrameVisitor};

/// Base output size, landscape.
pub const BASE_RESOLUTION: (u32, u32) = (1920, 1080);

/// Frame rate given to image sequences.
pub const IMAGE_SEQUENCE_FPS: FrameRate = FrameRate::FPS_30;

/// Image files sorted by name and scaled to one output resolution.
pub struct ImageSequenceSource {
    name: String,
    files: Vec<PathBuf>,
    width: u32,
    height: u32,
    frame_rate: FrameRate,
}

fn image_error(path: &Path, e: impl std::fmt::Display) -> VidstabError {
    VidstabError::Image(format!("{}: {e}", path.display()))
}

/// Output size for a sequence whose first image is `first_w` x `first_h`:
/// 1080p in the image's orientation, doubled when the image is larger.
pub fn output_size(first_w: u32, first_h: u32) -> (u32, u32) {
    let (mut w, mut h) = BASE_RESOLUTION;
    if first_w < first_h {
        std::mem::swap(&mut w, &mut h);
    }
    if first_w > w || first_h > h {
        w *= 2;
        h *= 2;
    }
    (w, h)
}

/// Scale to cover `width` x `height` keeping the aspect ratio, then crop
/// the center. Upscaling uses Lanczos3, downscaling a triangle filter.
pub fn fit_image(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        return img;
    }
    let upscale = img.width() < width || img.height() < height;
    let filter = if upscale {
        FilterType::Lanczos3
    } else {
        FilterType::Triangle
    };
    img.resize_to_fill(width, height, filter)
}

impl ImageSequenceSource {
    /// Every decodable image file directly inside `dir`.
    pub fn from_dir<P: AsRef<Path>>(
        dir: P,
        fixed_resolution: Option<(u32, u32)>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && ImageFormat::from_path(&path).is_ok() {
                files.push(path);
            }
        }
        Self::from_files(files, fixed_resolution)
    }

    pub fn from_files(
        mut files: Vec<PathBuf>,
        fixed_resolution: Option<(u32, u32)>,
    ) -> Result<Self> {
        if files.is_empty() {
            return Err(VidstabError::SourceUnavailable(
                "image sequence is empty".to_string(),
            ));
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let (width, height) = match fixed_resolution {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            Some(_) => {
                return Err(VidstabError::InvalidParameter(
                    "fixed resolution must be non-zero".to_string(),
                ))
            }
            None => {
                let (fw, fh) =
                    image::image_dimensions(&files[0]).map_err(|e| image_error(&files[0], e))?;
                output_size(fw, fh)
            }
        };

        info!(
            "Image sequence: {} files, output {}x{}",
            files.len(),
            width,
            height
        );

        Ok(Self {
            name: source_name(&files[0]),
            files,
            width,
            height,
            frame_rate: IMAGE_SEQUENCE_FPS,
        })
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        if frame_rate.is_valid() {
            self.frame_rate = frame_rate;
        }
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn load(&self, path: &Path) -> Result<FrameBuffer> {
        let img = image::open(path).map_err(|e| image_error(path, e))?;
        let rgb = fit_image(img, self.width, self.height).into_rgb8();
        FrameBuffer::from_raw(self.width, self.height, PixelFormat::Rgb8, rgb.into_raw())
    }
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn for_each_frame(&mut self, visitor: &mut FrameVisitor<'_>) -> Result<()> {
        let total = self.files.len();
        for (i, path) in self.files.iter().enumerate() {
            let frame = self.load(path)?;
            debug!(index = i, file = %path.display(), "image loaded");
            if !visitor(i, total, &frame) {
                break;
            }
        }
        Ok(())
    }
}
