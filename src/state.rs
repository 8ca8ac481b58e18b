use crate::error::{DqnError, Result};

/// A raw observation: row-major `height × width × channels` pixels, the layout
/// emulators hand out.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    height: usize,
    width: usize,
    channels: usize,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(height: usize, width: usize, channels: usize, pixels: Vec<u8>) -> Result<Self> {
        if height == 0 || width == 0 || channels == 0 {
            return Err(DqnError::MalformedObservation(format!(
                "empty frame shape {height}x{width}x{channels}"
            )));
        }
        let expected = height * width * channels;
        if pixels.len() != expected {
            return Err(DqnError::MalformedObservation(format!(
                "{} bytes do not fill a {height}x{width}x{channels} frame ({expected} expected)",
                pixels.len()
            )));
        }
        Ok(Self {
            height,
            width,
            channels,
            pixels,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_shape() {
        let frame = Frame::new(2, 3, 3, vec![0; 18]).unwrap();
        assert_eq!(frame.shape(), (2, 3, 3));
        assert_eq!(frame.pixels().len(), 18);
    }

    #[test]
    fn test_frame_rejects_wrong_length() {
        let err = Frame::new(2, 3, 3, vec![0; 17]).unwrap_err();
        assert!(matches!(err, DqnError::MalformedObservation(_)));
    }

    #[test]
    fn test_frame_rejects_empty_shape() {
        assert!(Frame::new(0, 3, 3, vec![]).is_err());
    }
}
