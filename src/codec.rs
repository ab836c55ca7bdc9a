//! JPEG decoding of captured frames

use jpeg_decoder::{Decoder, PixelFormat};
use thiserror::Error;

/// Decoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a decodable JPEG image
    #[error("jpeg decoding failed: {0}")]
    Decode(#[from] jpeg_decoder::Error),

    /// The decoder finished without reporting image dimensions
    #[error("decoded image carries no header information")]
    MissingInfo,

    /// Output format this module does not know how to expand
    #[error("unsupported pixel format {0:?}")]
    Unsupported(PixelFormat),

    /// Decoded sample count does not match the reported dimensions
    #[error("expected {expected} bytes of pixel data, decoder produced {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// A decoded image, one 0xAARRGGBB word per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

/// Decodes a JPEG (or MJPEG frame) into opaque ARGB pixels
///
/// The input is only read, so it is fine to pass a frame that is still on loan from the
/// driver.
pub fn decode(bytes: &[u8]) -> Result<Image, CodecError> {
    let mut decoder = Decoder::new(bytes);
    let data = decoder.decode()?;
    let info = decoder.info().ok_or(CodecError::MissingInfo)?;

    let width = u32::from(info.width);
    let height = u32::from(info.height);
    let pixels = expand(info.pixel_format, &data, width as usize * height as usize)?;

    Ok(Image {
        width,
        height,
        pixels,
    })
}

fn argb(r: u8, g: u8, b: u8) -> u32 {
    0xff00_0000 | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

fn expand(format: PixelFormat, data: &[u8], count: usize) -> Result<Vec<u32>, CodecError> {
    #[allow(unreachable_patterns)]
    let bpp = match format {
        PixelFormat::L8 => 1,
        PixelFormat::L16 => 2,
        PixelFormat::RGB24 => 3,
        PixelFormat::CMYK32 => 4,
        other => return Err(CodecError::Unsupported(other)),
    };

    let expected = count * bpp;
    if data.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let chunks = data[..expected].chunks_exact(bpp);
    let pixels = match format {
        PixelFormat::L8 => chunks.map(|p| argb(p[0], p[0], p[0])).collect(),
        // big endian samples, keep the most significant byte
        PixelFormat::L16 => chunks.map(|p| argb(p[0], p[0], p[0])).collect(),
        PixelFormat::RGB24 => chunks.map(|p| argb(p[0], p[1], p[2])).collect(),
        _ => chunks
            .map(|p| {
                let k = u32::from(255 - p[3]);
                let channel = |c: u8| (u32::from(255 - c) * k / 255) as u8;
                argb(channel(p[0]), channel(p[1]), channel(p[2]))
            })
            .collect(),
    };

    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(&[0x00, 0x01, 0x02, 0x03]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn truncated_jpeg_is_rejected() {
        // start of image marker followed by nothing useful
        assert!(decode(&[0xff, 0xd8, 0xff, 0xd9]).is_err());
    }

    #[test]
    fn expands_rgb_and_gray() {
        let rgb = expand(PixelFormat::RGB24, &[0x12, 0x34, 0x56, 0xff, 0x00, 0x80], 2).unwrap();
        assert_eq!(rgb, vec![0xff12_3456, 0xffff_0080]);

        let gray = expand(PixelFormat::L8, &[0x00, 0x7f], 2).unwrap();
        assert_eq!(gray, vec![0xff00_0000, 0xff7f_7f7f]);
    }

    #[test]
    fn expands_cmyk() {
        let white = expand(PixelFormat::CMYK32, &[0, 0, 0, 0], 1).unwrap();
        assert_eq!(white, vec![0xffff_ffff]);

        let black = expand(PixelFormat::CMYK32, &[0, 0, 0, 255], 1).unwrap();
        assert_eq!(black, vec![0xff00_0000]);
    }

    #[test]
    fn short_output_is_reported() {
        assert!(matches!(
            expand(PixelFormat::RGB24, &[1, 2, 3], 2),
            Err(CodecError::Truncated {
                expected: 6,
                actual: 3
            })
        ));
    }
}
