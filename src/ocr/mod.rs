// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Text extraction from screen captures
//!
//! Captures are converted to grayscale, hard-thresholded to black and white,
//! handed to an OCR engine, and the engine's output is flattened into one
//! dense line suited to summarization.

pub mod tesseract;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::OcrConfig;
use crate::Result;

pub use tesseract::TesseractCli;

/// An OCR capability
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Recognize text in an already preprocessed image
    async fn recognize(&self, image: &GrayImage) -> Result<String>;
}

/// OCR output for one capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub source_path: PathBuf,
    pub raw_text: String,
    pub cleaned_text: String,
}

impl ExtractedDocument {
    pub fn from_raw(source_path: PathBuf, raw_text: String, min_line_len: usize) -> Self {
        let cleaned_text = clean_ocr_text(&raw_text, min_line_len);
        Self { source_path, raw_text, cleaned_text }
    }

    pub fn is_empty(&self) -> bool {
        self.cleaned_text.trim().is_empty()
    }
}

/// Grayscale then binary threshold: luma above `threshold` becomes white
pub fn preprocess(image: &DynamicImage, threshold: u8) -> GrayImage {
    let mut gray = image.to_luma8();
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
    gray
}

/// Drop short noise lines and join the rest with single spaces.
///
/// A line survives when its trimmed length is greater than `min_line_len`
/// characters.
pub fn clean_ocr_text(raw: &str, min_line_len: usize) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > min_line_len)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Preprocessing plus OCR plus cleanup
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
    threshold: u8,
    min_line_len: usize,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        let defaults = OcrConfig::default();
        Self {
            engine,
            threshold: defaults.threshold,
            min_line_len: defaults.min_line_len,
        }
    }

    pub fn from_config(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Self {
        Self {
            engine,
            threshold: config.threshold,
            min_line_len: config.min_line_len,
        }
    }

    /// Run OCR on a decoded image, keeping both raw and cleaned text
    pub async fn extract_document(&self, source: &Path, image: &DynamicImage) -> Result<ExtractedDocument> {
        let binary = preprocess(image, self.threshold);
        debug!("Running {} OCR on {}x{} image", self.engine.name(), binary.width(), binary.height());

        let raw = self.engine.recognize(&binary).await?;
        let document = ExtractedDocument::from_raw(source.to_path_buf(), raw, self.min_line_len);

        info!(
            "Extracted {} characters ({} raw) from {:?}",
            document.cleaned_text.len(),
            document.raw_text.len(),
            source
        );
        Ok(document)
    }

    /// Cleaned text for a decoded image
    pub async fn extract_image(&self, image: &DynamicImage) -> Result<String> {
        Ok(self.extract_document(Path::new(""), image).await?.cleaned_text)
    }

    /// Cleaned text for an image file.
    ///
    /// An empty path or a file that does not decode yields `""`, meaning
    /// nothing was extracted.
    pub async fn extract_path(&self, path: &Path) -> Result<String> {
        if path.as_os_str().is_empty() {
            return Ok(String::new());
        }
        let image = match crate::loader::decode_file(path) {
            Ok(img) => img,
            Err(e) => {
                debug!("Cannot decode {:?} for OCR: {}", path, e);
                return Ok(String::new());
            }
        };
        Ok(self.extract_document(path, &image).await?.cleaned_text)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// Returns canned text and remembers what it was shown
    pub(crate) struct CannedOcr {
        pub text: String,
        pub seen: Mutex<Vec<GrayImage>>,
    }

    impl CannedOcr {
        pub(crate) fn new(text: &str) -> Self {
            Self { text: text.to_string(), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl OcrEngine for CannedOcr {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn recognize(&self, image: &GrayImage) -> Result<String> {
            self.seen.lock().unwrap().push(image.clone());
            Ok(self.text.clone())
        }
    }

    #[test]
    fn test_clean_drops_short_lines() {
        let raw = "Hi\nHello World\nOk\nThis is a longer line";
        assert_eq!(clean_ocr_text(raw, 5), "Hello World This is a longer line");
    }

    #[test]
    fn test_clean_boundary_is_exclusive() {
        // exactly five characters is noise, six survives
        assert_eq!(clean_ocr_text("abcde\nabcdef", 5), "abcdef");
        assert_eq!(clean_ocr_text("   padded line   \n\n\t\n", 5), "padded line");
    }

    #[test]
    fn test_clean_counts_characters_not_bytes() {
        assert_eq!(clean_ocr_text("héllo\nnaïveté", 5), "naïveté");
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(clean_ocr_text("", 5), "");
    }

    #[test]
    fn test_preprocess_is_binary() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 255, 255]));
        img.put_pixel(1, 0, Rgb([150, 150, 150]));
        img.put_pixel(2, 0, Rgb([20, 40, 60]));

        let binary = preprocess(&DynamicImage::ImageRgb8(img), 150);
        let values: Vec<u8> = binary.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![255, 0, 0]);
    }

    #[tokio::test]
    async fn test_extract_image_feeds_binary_image_to_engine() {
        let engine = Arc::new(CannedOcr::new("Hi\nHello World\nOk\nThis is a longer line"));
        let extractor = TextExtractor::new(engine.clone());

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 200, 200])));
        let text = extractor.extract_image(&img).await.unwrap();

        assert_eq!(text, "Hello World This is a longer line");
        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].pixels().all(|p| p.0[0] == 255));
    }

    #[tokio::test]
    async fn test_extract_path_empty_and_undecodable() {
        let engine = Arc::new(CannedOcr::new("should never be used"));
        let extractor = TextExtractor::new(engine.clone());

        assert_eq!(extractor.extract_path(Path::new("")).await.unwrap(), "");

        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("garbage.png");
        std::fs::write(&bogus, b"not an image").unwrap();
        assert_eq!(extractor.extract_path(&bogus).await.unwrap(), "");

        assert!(engine.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_path_misnamed_capture() {
        let engine = Arc::new(CannedOcr::new("Deploy window starts at 18:00"));
        let extractor = TextExtractor::new(engine.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jpg");
        RgbImage::from_pixel(4, 4, Rgb([240, 240, 240]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        assert_eq!(extractor.extract_path(&path).await.unwrap(), "Deploy window starts at 18:00");
        assert_eq!(engine.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extract_document_keeps_raw_text() {
        let extractor = TextExtractor::new(Arc::new(CannedOcr::new("tiny\nMeeting at 10am Tuesday")));
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let doc = extractor.extract_document(Path::new("/shots/a.png"), &img).await.unwrap();

        assert_eq!(doc.raw_text, "tiny\nMeeting at 10am Tuesday");
        assert_eq!(doc.cleaned_text, "Meeting at 10am Tuesday");
        assert_eq!(doc.source_path, PathBuf::from("/shots/a.png"));
        assert!(!doc.is_empty());
    }
}
