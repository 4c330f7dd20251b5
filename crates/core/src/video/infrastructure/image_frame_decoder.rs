use crate::shared::frame::Frame;
use crate::video::domain::frame_decoder::{DecodeError, FrameDecoder};

/// Decodes any still-image format the `image` crate recognises to RGB8.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFrameDecoder;

impl ImageFrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let rgb = image::load_from_memory(bytes)
            .map_err(|e| DecodeError::Format(Box::new(e)))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroSized);
        }
        Ok(Frame::new(rgb.into_raw(), width, height, 3, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, _| image::Rgb([x as u8, 10, 200]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_decodes_png_to_rgb_frame() {
        let frame = ImageFrameDecoder::new().decode(&encode_png(4, 3), 7).unwrap();
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 7);
        assert_eq!(frame.as_ndarray()[[0, 2, 0]], 2);
        assert_eq!(frame.as_ndarray()[[2, 1, 2]], 200);
    }

    #[test]
    fn test_empty_bytes() {
        assert!(matches!(
            ImageFrameDecoder::new().decode(&[], 0),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn test_garbage_bytes() {
        assert!(matches!(
            ImageFrameDecoder::new().decode(b"definitely not an image", 0),
            Err(DecodeError::Format(_))
        ));
    }
}
