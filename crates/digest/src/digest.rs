use crate::checksum::hash_file;
use crate::classify::{self, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, ErrorKind, Result};
use async_trait::async_trait;
use ferry_asyncutils::Processor;
use std::path::{Path, PathBuf};

/// Options applied to every file of a digest run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DigestOptions {
    /// Record files that are not images as failures instead of digesting them.
    pub images_only: bool,
}

/// Metadata and checksum computed for a single local file.
///
/// Always produced, even when something went wrong: `error` is set and the
/// remaining fields hold whatever was learned before the failure.
#[derive(Debug)]
pub struct Digest {
    pub path: PathBuf,
    pub filename: String,
    pub is_image: bool,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub gigapixels: f64,
    pub checksum: Option<String>,
    pub content_type: String,
    pub error: Option<Error>,
}

impl Digest {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            filename: path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default(),
            is_image: false,
            size: 0,
            width: 0,
            height: 0,
            gigapixels: 0.0,
            checksum: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Record the pixel size and derive gigapixels from it.
    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.gigapixels = gigapixels(width, height);
    }

    fn fill(&mut self, options: DigestOptions) -> Result<()> {
        let metadata = std::fs::metadata(&self.path).map_err(|e| ErrorKind::from_io(e, &self.path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotAFile(self.path.clone()));
        }
        self.size = metadata.len();

        let sniffed = classify::sniff(&self.path)?;
        self.content_type = sniffed.content_type.to_string();
        self.is_image = sniffed.is_image;
        if self.is_image {
            let (width, height) = classify::dimensions(&self.path)?;
            self.set_dimensions(width, height);
        } else if options.images_only {
            exn::bail!(ErrorKind::NotAnImage(self.path.clone()));
        }

        self.checksum = Some(hash_file(&self.path)?);
        Ok(())
    }
}

/// `width × height` expressed in billions of pixels.
pub fn gigapixels(width: u32, height: u32) -> f64 {
    (f64::from(width) * f64::from(height)) / 1e9
}

/// Digest one file synchronously. Blocks on disk reads.
pub fn digest_path(path: &Path, options: DigestOptions) -> Digest {
    let mut digest = Digest::new(path);
    if let Err(err) = digest.fill(options) {
        tracing::debug!(path = %path.display(), error = ?err, "file could not be digested");
        digest.error = Some(err);
    }
    digest
}

/// [`Processor`] that digests each path on the blocking thread pool.
#[derive(Debug, Default, Clone)]
pub struct DigestProcessor {
    options: DigestOptions,
}

impl DigestProcessor {
    pub fn new(options: DigestOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Processor for DigestProcessor {
    type Input = PathBuf;
    type Output = Digest;

    async fn process(&self, path: PathBuf) -> Digest {
        let options = self.options;
        let blocking_path = path.clone();
        match tokio::task::spawn_blocking(move || digest_path(&blocking_path, options)).await {
            Ok(digest) => digest,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "digest task failed");
                let mut digest = Digest::new(&path);
                digest.error = Some(exn::Exn::from(ErrorKind::Task(path.clone())));
                digest
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0.0)]
    #[case(1000, 1000, 0.001)]
    #[case(100_000, 10_000, 1.0)]
    #[case(65_535, 65_535, 4.294_836_225)]
    fn test_gigapixels(#[case] width: u32, #[case] height: u32, #[case] expected: f64) {
        assert!((gigapixels(width, height) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_digest_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        image::RgbImage::new(200, 100).save(&path).unwrap();

        let digest = digest_path(&path, DigestOptions::default());
        assert!(digest.is_ok(), "{:?}", digest.error);
        assert!(digest.is_image);
        assert_eq!(digest.filename, "photo.png");
        assert_eq!(digest.content_type, "image/png");
        assert_eq!((digest.width, digest.height), (200, 100));
        assert_eq!(digest.size, std::fs::metadata(&path).unwrap().len());
        assert!((digest.gigapixels - 0.00002).abs() < 1e-12);
        assert_eq!(digest.checksum.as_deref(), Some(hash_file(&path).unwrap().as_str()));
    }

    #[test]
    fn test_digest_non_image_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let digest = digest_path(&path, DigestOptions::default());
        assert!(digest.is_ok());
        assert!(!digest.is_image);
        assert_eq!(digest.size, 32);
        assert_eq!(digest.gigapixels, 0.0);
        assert!(digest.checksum.is_some());
    }

    #[test]
    fn test_digest_non_image_rejected_when_images_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let digest = digest_path(&path, DigestOptions { images_only: true });
        let err = digest.error.as_ref().unwrap();
        assert!(matches!(&**err, ErrorKind::NotAnImage(_)));
        assert!(digest.checksum.is_none());
        assert_eq!(digest.size, 5);
    }

    #[test]
    fn test_digest_missing_file_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let digest = digest_path(&dir.path().join("gone.jpg"), DigestOptions::default());
        let err = digest.error.as_ref().unwrap();
        assert!(matches!(&**err, ErrorKind::NotFound(_)));
        assert_eq!(digest.filename, "gone.jpg");
    }

    #[tokio::test]
    async fn test_processor_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let digest = DigestProcessor::default().process(path).await;
        assert!(digest.is_ok());
        assert_eq!(digest.size, 10);
    }
}
