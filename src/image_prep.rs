use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat};
use log::debug;
use tempfile::NamedTempFile;

use crate::error::Error;

/// An upright re-encoded copy of a photo. The temporary file is deleted when
/// this value is dropped, whichever way the caller exits.
pub struct PreparedImage {
    file: NamedTempFile,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// EXIF orientation tag of an encoded image, 1 (upright) when absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Rotates/flips pixels so that orientation `1` would describe them.
/// Values outside 1-8 leave the image as it is.
pub fn apply_orientation(mut img: DynamicImage, orientation: u32) -> DynamicImage {
    if let Some(orientation) = u8::try_from(orientation).ok().and_then(Orientation::from_exif) {
        img.apply_orientation(orientation);
    }
    img
}

pub fn prepare(path: &Path) -> Result<PreparedImage, Error> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::AssetMissing(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    let source_format = image::guess_format(&bytes)?;
    let img = image::load_from_memory_with_format(&bytes, source_format)?;

    let orientation = read_exif_orientation(&bytes);
    let img = apply_orientation(img, orientation);
    debug!(
        "Prepared {} (orientation {orientation}, {}x{}px)",
        path.display(),
        img.width(),
        img.height()
    );

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| source_format.extensions_str().first().copied().unwrap_or("png").into());
    let format = ImageFormat::from_extension(&ext).unwrap_or(source_format);
    let img = match format {
        // JPEG carries no alpha and no 16-bit samples.
        ImageFormat::Jpeg => match img {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        _ => img,
    };

    let mut file = tempfile::Builder::new()
        .prefix("class-reports-")
        .suffix(&format!(".{ext}"))
        .tempfile()?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        img.write_to(&mut writer, format)?;
        writer.flush()?;
    }

    Ok(PreparedImage { file, width: img.width(), height: img.height() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// JPEG bytes carrying an EXIF APP1 segment with the given orientation.
    fn jpeg_with_orientation(width: u32, height: u32, orientation: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 30])));
        let mut encoded = Cursor::new(Vec::new());
        img.write_to(&mut encoded, ImageFormat::Jpeg).unwrap();
        let encoded = encoded.into_inner();

        let mut tiff = b"MM\x00\x2a\x00\x00\x00\x08\x00\x01".to_vec();
        tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
        tiff.extend_from_slice(&[0x00, orientation, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let mut app1 = b"Exif\x00\x00".to_vec();
        app1.extend_from_slice(&tiff);
        let len = (app1.len() + 2) as u16;

        let mut out = encoded[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&app1);
        out.extend_from_slice(&encoded[2..]);
        out
    }

    #[test]
    fn reads_orientation_tag() {
        assert_eq!(read_exif_orientation(&jpeg_with_orientation(8, 4, 6)), 6);
        assert_eq!(read_exif_orientation(b"not an image"), 1);
    }

    #[test]
    fn rotated_photo_comes_out_upright() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portrait.JPG");
        std::fs::write(&path, jpeg_with_orientation(40, 20, 6)).unwrap();

        let prepared = prepare(&path).unwrap();
        assert_eq!((prepared.width, prepared.height), (20, 40));
        assert!(prepared.path().to_string_lossy().ends_with(".jpg"));
        assert_eq!(image::image_dimensions(prepared.path()).unwrap(), (20, 40));
    }

    #[test]
    fn orientation_flips_and_rotates_pixels() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        let img = DynamicImage::ImageRgb8(img);

        let mirrored = apply_orientation(img.clone(), 2).to_rgb8();
        assert_eq!(mirrored.get_pixel(0, 0), &Rgb([0, 0, 255]));

        let turned = apply_orientation(img.clone(), 8).to_rgb8();
        assert_eq!(turned.dimensions(), (1, 2));
        assert_eq!(turned.get_pixel(0, 0), &Rgb([0, 0, 255]));

        for unknown in [0, 1, 9, 300] {
            assert_eq!(apply_orientation(img.clone(), unknown), img);
        }
    }

    #[test]
    fn temporary_copy_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::from_pixel(3, 2, Rgb([0, 0, 0])).save(&path).unwrap();

        let prepared = prepare(&path).unwrap();
        let temp = prepared.path().to_path_buf();
        assert!(temp.exists());
        drop(prepared);
        assert!(!temp.exists());
    }

    #[test]
    fn missing_photo_is_reported_as_missing_asset() {
        let result = prepare(Path::new("/nonexistent/photo.jpg"));
        assert!(matches!(result, Err(Error::AssetMissing(_))));
    }
}
