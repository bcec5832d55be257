//! Immutable image handle.
//!
//! An [`ImageHandle`] wraps one decoded image. Pixel data sits behind an
//! `Arc`, so cloning a handle is cheap and transforms always build a new
//! handle instead of mutating the old one.

use crate::core::error::{ImageError, ImageResult};
use crate::core::types::{ImageFormat, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A decoded image plus where it came from and how it should be encoded.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    data: Arc<DynamicImage>,
    source: Option<PathBuf>,
    format: Option<ImageFormat>,
    quality: Quality,
}

impl ImageHandle {
    /// Wrap an in-memory image.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            data: Arc::new(image),
            source: None,
            format: None,
            quality: Quality::default(),
        }
    }

    /// Decode the image at `path`.
    ///
    /// The format is sniffed from the file contents, falling back to the
    /// extension.
    pub fn load(path: impl AsRef<Path>) -> ImageResult<Self> {
        let path = path.as_ref();
        let reader = image::ImageReader::open(path)
            .map_err(|e| ImageError::filesystem(path, e))?
            .with_guessed_format()
            .map_err(|e| ImageError::filesystem(path, e))?;

        let detected = reader.format();
        let format = match detected {
            Some(f) => ImageFormat::from_codec(f),
            None => ImageFormat::from_path(path),
        };
        if detected.is_none() && format.is_none() {
            return Err(ImageError::UnsupportedFormat {
                format: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let image = reader
            .decode()
            .map_err(|e| ImageError::from_decoder(path, e))?;

        Ok(Self {
            data: Arc::new(image),
            source: Some(path.to_path_buf()),
            format,
            quality: Quality::default(),
        })
    }

    /// Encode to `path`. Parent directories must already exist.
    ///
    /// If the encoder rejects the image, the partly written file is removed.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        format: ImageFormat,
        quality: Quality,
    ) -> ImageResult<()> {
        let path = path.as_ref();
        let image = self.prepared_for(format);

        let file = File::create(path).map_err(|e| ImageError::filesystem(path, e))?;
        let mut writer = BufWriter::new(file);

        let encoded = match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut writer, quality.value());
                image.write_with_encoder(encoder)
            }
            other => image.write_to(&mut writer, other.to_codec()),
        };
        if let Err(e) = encoded {
            drop(writer);
            let _ = fs::remove_file(path);
            return Err(ImageError::from_encoder(path, e));
        }

        writer.flush().map_err(|e| ImageError::filesystem(path, e))
    }

    /// Encode using the handle's own target format and quality, or the
    /// format implied by the destination extension.
    pub fn save_auto(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        let path = path.as_ref();
        let format = self
            .format
            .or_else(|| ImageFormat::from_path(path))
            .ok_or_else(|| ImageError::UnsupportedFormat {
                format: path.display().to_string(),
            })?;
        self.save(path, format, self.quality)
    }

    /// Build a handle carrying new pixels but the same provenance.
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            data: Arc::new(image),
            source: self.source.clone(),
            format: self.format,
            quality: self.quality,
        }
    }

    /// Build a handle with a different target encoding.
    pub fn with_encoding(&self, format: ImageFormat, quality: Quality) -> Self {
        Self {
            data: Arc::clone(&self.data),
            source: self.source.clone(),
            format: Some(format),
            quality,
        }
    }

    /// Borrow the pixels.
    pub fn image(&self) -> &DynamicImage {
        &self.data
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.data.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.data.height()
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    /// Format the image was decoded from, or the target set by a conversion.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    /// Encoder quality used by [`save_auto`](Self::save_auto).
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Path the image was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Whether the pixel data has an alpha channel.
    pub fn has_alpha(&self) -> bool {
        self.data.color().has_alpha()
    }

    /// Drop channels or bit depth the target encoder cannot write.
    fn prepared_for(&self, format: ImageFormat) -> DynamicImage {
        if !format.supports_alpha() {
            return DynamicImage::ImageRgb8(self.data.to_rgb8());
        }
        match format {
            ImageFormat::Gif | ImageFormat::WebP => DynamicImage::ImageRgba8(self.data.to_rgba8()),
            _ => (*self.data).clone(),
        }
    }
}
