//! File type sniffing and image dimension probing.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::ImageReader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Leading bytes inspected when sniffing a file type.
pub const SNIFF_LEN: u64 = 8192;
/// Content type reported when the leading bytes match no known signature.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub content_type: &'static str,
    pub is_image: bool,
}

impl Sniffed {
    /// Classify from a header buffer.
    pub fn from_head(head: &[u8]) -> Self {
        let content_type = infer::get(head).map(|kind| kind.mime_type()).unwrap_or(DEFAULT_CONTENT_TYPE);
        Self {
            content_type,
            is_image: infer::is_image(head),
        }
    }
}

/// Read the first [`SNIFF_LEN`] bytes of `path` and classify them.
pub fn sniff(path: &Path) -> Result<Sniffed> {
    let file = File::open(path).map_err(|e| ErrorKind::from_io(e, path))?;
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN).read_to_end(&mut head).map_err(|e| ErrorKind::from_io(e, path))?;
    Ok(Sniffed::from_head(&head))
}

/// Width and height of an image, read from its header without decoding pixels.
pub fn dimensions(path: &Path) -> Result<(u32, u32)> {
    let reader = ImageReader::open(path)
        .map_err(|e| ErrorKind::from_io(e, path))?
        .with_guessed_format()
        .map_err(|e| ErrorKind::from_io(e, path))?;
    reader.into_dimensions().or_raise(|| ErrorKind::Dimensions(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".as_slice(), "image/png", true)]
    #[case(b"\xFF\xD8\xFF\xE0\0\x10JFIF\0".as_slice(), "image/jpeg", true)]
    #[case(b"GIF89a\x01\0\x01\0".as_slice(), "image/gif", true)]
    #[case(b"%PDF-1.7\n".as_slice(), "application/pdf", false)]
    #[case(b"solid cube\nfacet normal".as_slice(), DEFAULT_CONTENT_TYPE, false)]
    #[case(b"".as_slice(), DEFAULT_CONTENT_TYPE, false)]
    fn test_sniff_head(#[case] head: &[u8], #[case] content_type: &str, #[case] is_image: bool) {
        let sniffed = Sniffed::from_head(head);
        assert_eq!(sniffed.content_type, content_type);
        assert_eq!(sniffed.is_image, is_image);
    }

    #[test]
    fn test_png_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(640, 480).save(&path).unwrap();

        assert!(sniff(&path).unwrap().is_image);
        assert_eq!(dimensions(&path).unwrap(), (640, 480));
    }

    #[test]
    fn test_truncated_image_has_no_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();

        assert!(sniff(&path).unwrap().is_image);
        let err = dimensions(&path).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Dimensions(_)));
    }
}
