use std::io::Cursor;

use anyhow::Result;
use base64::{prelude::BASE64_STANDARD, Engine};
use image::{DynamicImage, ImageFormat, RgbImage};
use libheif_rs::{ColorSpace, HeifContext, HeifError, LibHeif, RgbChroma};

use crate::InfuError;

/// Major brands of HEIF still images and sequences (HEVC and generic).
const HEIF_BRANDS: [&[u8; 4]; 10] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
];

/// Decodes an uploaded image. HEIF/HEIC photos go through libheif; AVIF and
/// every other format go through the `image` crate.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, InfuError> {
    if is_heif(bytes) {
        return decode_heif(bytes);
    }
    image::load_from_memory(bytes).map_err(|e| InfuError::InvalidImage(e.to_string()))
}

/// Sniffs the ISO-BMFF `ftyp` box for a HEIF major brand.
fn is_heif(bytes: &[u8]) -> bool {
    match (bytes.get(4..8), bytes.get(8..12)) {
        (Some(tag), Some(brand)) if tag == b"ftyp" => {
            HEIF_BRANDS.iter().any(|b| b.as_slice() == brand)
        }
        _ => false,
    }
}

fn decode_heif(bytes: &[u8]) -> Result<DynamicImage, InfuError> {
    let invalid = |e: HeifError| InfuError::InvalidImage(e.to_string());
    let context = HeifContext::read_from_bytes(bytes).map_err(invalid)?;
    let handle = context.primary_image_handle().map_err(invalid)?;
    let decoded = LibHeif::new()
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(invalid)?;

    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| InfuError::InvalidImage("HEIF image has no RGB plane".to_string()))?;
    let row = plane.width as usize * 3;
    let mut pixels = Vec::with_capacity(row * plane.height as usize);
    for line in plane.data.chunks(plane.stride).take(plane.height as usize) {
        let line = line
            .get(..row)
            .ok_or_else(|| InfuError::InvalidImage("truncated HEIF plane".to_string()))?;
        pixels.extend_from_slice(line);
    }
    RgbImage::from_raw(plane.width, plane.height, pixels)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| InfuError::InvalidImage("truncated HEIF plane".to_string()))
}

pub fn image_to_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encodes an image as a base64 PNG.
pub fn image_to_base64_png(img: &DynamicImage) -> Result<String> {
    Ok(BASE64_STANDARD.encode(image_to_png(img)?))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(brand);
        bytes.extend_from_slice(&[0; 12]);
        bytes
    }

    #[test]
    fn test_png_base64_decodes_back() {
        let img = DynamicImage::new_rgb8(3, 2);
        let encoded = image_to_base64_png(&img).unwrap();
        let bytes = BASE64_STANDARD.decode(encoded).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn test_garbage_is_invalid_image() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(InfuError::InvalidImage(_))
        ));
    }

    #[rstest]
    #[case(b"heic", true)]
    #[case(b"heix", true)]
    #[case(b"mif1", true)]
    #[case(b"avif", false)]
    #[case(b"isom", false)]
    fn test_heif_brand_sniffing(#[case] brand: &[u8; 4], #[case] expected: bool) {
        assert_eq!(is_heif(&ftyp(brand)), expected);
    }

    #[test]
    fn test_short_input_is_not_heif() {
        assert!(!is_heif(b"\0\0\0\x18ftyp"));
    }

    #[test]
    fn test_avif_upload_decodes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([200, 40, 40])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Avif)
            .unwrap();

        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn test_broken_heic_is_invalid_image() {
        assert!(matches!(
            decode_image(&ftyp(b"heic")),
            Err(InfuError::InvalidImage(_))
        ));
    }

    #[test]
    #[ignore = "needs libheif built with an HEVC encoder plugin"]
    fn test_heic_upload_decodes() {
        use libheif_rs::{Channel, CompressionFormat, Image};

        let mut image = Image::new(16, 8, ColorSpace::Rgb(RgbChroma::Rgb)).unwrap();
        image.create_plane(Channel::Interleaved, 16, 8, 8).unwrap();
        {
            let mut planes = image.planes_mut();
            planes.interleaved.as_mut().unwrap().data.fill(128);
        }
        let lib = LibHeif::new();
        let mut encoder = lib.encoder_for_format(CompressionFormat::Hevc).unwrap();
        let mut context = HeifContext::new().unwrap();
        context.encode_image(&image, &mut encoder, None).unwrap();
        let bytes = context.write_to_bytes().unwrap();

        assert!(is_heif(&bytes));
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
