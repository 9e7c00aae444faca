//! LC-3 object image format.
//!
//! An image is a flat big-endian byte stream:
//! - the first word is the origin, the address to load at
//! - every following word is copied to consecutive addresses
//!
//! A trailing odd byte cannot form a word and is dropped.

use std::path::Path;

use crate::cpu::memory::MEMORY_SIZE;
use crate::word::Word;
use log::{debug, warn};
use thiserror::Error;

/// A parsed image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first word.
    pub origin: Word,
    /// Words to load, in host order.
    pub words: Vec<Word>,
}

impl Image {
    /// Parse an image from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        let (header, body) = match bytes {
            [hi, lo, rest @ ..] => ([*hi, *lo], rest),
            _ => return Err(ImageError::MissingOrigin),
        };
        let origin = Word::from_be_bytes(header);

        let chunks = body.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            warn!("image has an odd trailing byte, ignoring it");
        }
        let words: Vec<Word> = chunks
            .map(|pair| Word::from_be_bytes([pair[0], pair[1]]))
            .collect();

        let available = MEMORY_SIZE - origin as usize;
        if words.len() > available {
            return Err(ImageError::TooLarge {
                origin,
                size: words.len(),
                available,
            });
        }

        Ok(Self { origin, words })
    }

    /// Number of words to load.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if there is nothing to load.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| ImageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let image = Image::parse(&bytes)?;
    debug!(
        "{}: {} words at {:#06x}",
        path.display(),
        image.len(),
        image.origin
    );
    Ok(image)
}

/// Errors that can occur while reading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("image is too short to hold an origin")]
    MissingOrigin,

    #[error("image of {size} words at {origin:#06x} exceeds the {available} words left in memory")]
    TooLarge { origin: Word, size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image() {
        let image = Image::parse(&[0x30, 0x00, 0xF0, 0x25, 0x12, 0x34]).unwrap();
        assert_eq!(image.origin, 0x3000);
        assert_eq!(image.words, vec![0xF025, 0x1234]);
    }

    #[test]
    fn test_parse_origin_only() {
        let image = Image::parse(&[0x40, 0x00]).unwrap();
        assert_eq!(image.origin, 0x4000);
        assert!(image.is_empty());
    }

    #[test]
    fn test_parse_missing_origin() {
        assert_eq!(Image::parse(&[]), Err(ImageError::MissingOrigin));
        assert_eq!(Image::parse(&[0x30]), Err(ImageError::MissingOrigin));
    }

    #[test]
    fn test_parse_drops_odd_byte() {
        let image = Image::parse(&[0x30, 0x00, 0xAB, 0xCD, 0xEF]).unwrap();
        assert_eq!(image.words, vec![0xABCD]);
    }

    #[test]
    fn test_parse_fills_to_last_address() {
        let image = Image::parse(&[0xFF, 0xFF, 0x00, 0x07]).unwrap();
        assert_eq!(image.origin, 0xFFFF);
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn test_parse_rejects_overflow() {
        let err = Image::parse(&[0xFF, 0xFF, 0x00, 0x01, 0x00, 0x02]).unwrap_err();
        assert_eq!(err, ImageError::TooLarge { origin: 0xFFFF, size: 2, available: 1 });
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_image("/nonexistent/dir/program.obj").unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
    }

    #[test]
    fn test_load_image_from_disk() {
        let path = std::env::temp_dir().join(format!("lc3-image-{}.obj", std::process::id()));
        std::fs::write(&path, [0x30, 0x00, 0xF0, 0x25]).unwrap();

        let image = load_image(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(image, Image { origin: 0x3000, words: vec![0xF025] });
    }
}
