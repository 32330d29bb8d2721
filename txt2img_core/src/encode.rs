use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::GenerateError;

/// Encode a generated image as PNG bytes for inline display.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, GenerateError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn encodes_png() {
        let image = DynamicImage::new_rgb8(4, 4);
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], &PNG_SIGNATURE);
    }
}
