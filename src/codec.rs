//! Reads and writes 8- and 16-bit grayscale images, and reports
//! dimensions without decoding pixel data.
//!
//! A standalone adapter over the `image`/`tiff` crates with a cheap
//! dimensions probe and a compression toggle on TIFF output.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageReader, Luma};
use log::warn;
use tiff::encoder::{colortype, compression, TiffEncoder};

use crate::error::BuildError;

/// A decoded grayscale slice, tagged by bit depth. Pixel buffers are
/// kept as flat row-major `Vec`s (`ImageBuffer::into_raw`) rather than
/// a dependency on a dedicated n-dimensional array crate.
#[derive(Debug, Clone)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_u16(&self) -> bool {
        matches!(self, PixelBuffer::U16(_))
    }
}

/// A single decoded (or synthesized) slice with its dimensions.
#[derive(Debug, Clone)]
pub struct Slice {
    pub width: u32,
    pub height: u32,
    pub pixels: PixelBuffer,
}

impl Slice {
    pub fn new(width: u32, height: u32, pixels: PixelBuffer) -> Self {
        Self { width, height, pixels }
    }
}

/// Stateless image I/O boundary. All pixel access in the crate goes
/// through this adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codec;

impl Codec {
    /// Returns `(width, height)` without decoding pixel data.
    pub fn dimensions(&self, path: &Path) -> Result<(u32, u32), BuildError> {
        image::image_dimensions(path)
            .map_err(|_| BuildError::CorruptedImage(path.to_path_buf()))
    }

    /// Returns 16 when the file is single-channel 16-bit grayscale,
    /// and 8 for everything else (including unknown color modes,
    /// which are logged and treated as 8-bit).
    pub fn detect_bit_depth(&self, path: &Path) -> Result<u8, BuildError> {
        let reader = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|_| BuildError::CorruptedImage(path.to_path_buf()))?;
        let decoder = reader
            .into_decoder()
            .map_err(|_| BuildError::CorruptedImage(path.to_path_buf()))?;
        Ok(match decoder.color_type() {
            image::ColorType::L16 => 16,
            image::ColorType::L8 => 8,
            other => {
                warn!("unrecognized color mode {other:?} in {path:?}, treating as 8-bit");
                8
            }
        })
    }

    /// Decodes `path` into a grayscale [`Slice`], preserving 8- vs
    /// 16-bit depth rather than normalizing everything to one width.
    pub fn read(&self, path: &Path) -> Result<Slice, BuildError> {
        let img = ImageReader::open(path)?
            .with_guessed_format()
            .map_err(|_| BuildError::CorruptedImage(path.to_path_buf()))?
            .decode()
            .map_err(|_| BuildError::CorruptedImage(path.to_path_buf()))?;
        Ok(to_slice(img))
    }

    /// Writes `slice` to `path`. For TIFF output, `compression`
    /// selects a lossless deflate codec when true and no compression
    /// when false; other formats are written through the `image`
    /// crate's own encoder (which does not expose a compression
    /// knob for BMP/PNG/JPEG in the way this crate needs for TIFF).
    pub fn write(&self, slice: &Slice, path: &Path, compression_enabled: bool) -> Result<(), BuildError> {
        let is_tiff = path
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                ext == "tif" || ext == "tiff"
            })
            .unwrap_or(false);

        if is_tiff {
            write_tiff(slice, path, compression_enabled)
        } else {
            write_via_image_crate(slice, path)
        }
    }
}

fn to_slice(img: DynamicImage) -> Slice {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            let (w, h) = gray.dimensions();
            Slice::new(w, h, PixelBuffer::U8(gray.into_raw()))
        }
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            Slice::new(w, h, PixelBuffer::U8(gray.into_raw()))
        }
        DynamicImage::ImageLuma16(gray) => {
            let (w, h) = gray.dimensions();
            Slice::new(w, h, PixelBuffer::U16(gray.into_raw()))
        }
        DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgb32F(_)
        | DynamicImage::ImageRgba32F(_) => {
            let gray = img.to_luma16();
            let (w, h) = gray.dimensions();
            Slice::new(w, h, PixelBuffer::U16(gray.into_raw()))
        }
        _ => {
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            Slice::new(w, h, PixelBuffer::U8(gray.into_raw()))
        }
    }
}

fn write_tiff(slice: &Slice, path: &Path, compression_enabled: bool) -> Result<(), BuildError> {
    let file = File::create(path).map_err(|e| write_failed(path, e))?;
    let writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(writer).map_err(|e| write_failed(path, e))?;

    match &slice.pixels {
        PixelBuffer::U8(data) => {
            if compression_enabled {
                encoder
                    .write_image_with_compression::<colortype::Gray8, compression::Deflate>(
                        slice.width,
                        slice.height,
                        data,
                        compression::DeflateLevel::Default,
                    )
                    .map_err(|e| write_failed(path, e))?;
            } else {
                encoder
                    .write_image::<colortype::Gray8>(slice.width, slice.height, data)
                    .map_err(|e| write_failed(path, e))?;
            }
        }
        PixelBuffer::U16(data) => {
            if compression_enabled {
                encoder
                    .write_image_with_compression::<colortype::Gray16, compression::Deflate>(
                        slice.width,
                        slice.height,
                        data,
                        compression::DeflateLevel::Default,
                    )
                    .map_err(|e| write_failed(path, e))?;
            } else {
                encoder
                    .write_image::<colortype::Gray16>(slice.width, slice.height, data)
                    .map_err(|e| write_failed(path, e))?;
            }
        }
    }
    Ok(())
}

fn write_via_image_crate(slice: &Slice, path: &Path) -> Result<(), BuildError> {
    match &slice.pixels {
        PixelBuffer::U8(data) => {
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(slice.width, slice.height, data.clone())
                .ok_or_else(|| BuildError::Unexpected {
                    message: format!("pixel buffer size mismatch writing {path:?}"),
                })?;
            img.save(path).map_err(|e| write_failed(path, e))
        }
        PixelBuffer::U16(data) => {
            let img = ImageBuffer::<Luma<u16>, _>::from_raw(slice.width, slice.height, data.clone())
                .ok_or_else(|| BuildError::Unexpected {
                    message: format!("pixel buffer size mismatch writing {path:?}"),
                })?;
            img.save(path).map_err(|e| write_failed(path, e))
        }
    }
}

fn write_failed(path: &Path, err: impl std::fmt::Display) -> BuildError {
    BuildError::WriteFailed {
        path: path.to_path_buf(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_bit_depth_reports_16_for_u16_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tif");
        let codec = Codec;
        let slice = Slice::new(4, 4, PixelBuffer::U16(vec![1000; 16]));
        codec.write(&slice, &path, false).unwrap();
        assert_eq!(codec.detect_bit_depth(&path).unwrap(), 16);
    }

    #[test]
    fn detect_bit_depth_reports_8_for_u8_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tif");
        let codec = Codec;
        let slice = Slice::new(4, 4, PixelBuffer::U8(vec![10; 16]));
        codec.write(&slice, &path, false).unwrap();
        assert_eq!(codec.detect_bit_depth(&path).unwrap(), 8);
    }

    #[test]
    fn write_then_read_round_trips_u16_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tif");
        let codec = Codec;
        let slice = Slice::new(3, 2, PixelBuffer::U16(vec![0, 1000, 40000, 65535, 256, 512]));
        codec.write(&slice, &path, true).unwrap();
        let read_back = codec.read(&path).unwrap();
        assert_eq!((read_back.width, read_back.height), (3, 2));
        match read_back.pixels {
            PixelBuffer::U16(v) => assert_eq!(v, vec![0, 1000, 40000, 65535, 256, 512]),
            _ => panic!("unexpected dtype"),
        }
    }
}
