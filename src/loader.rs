// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Retrying image loader
//!
//! Screen-capture tools often fire the create event before the file is fully
//! flushed, so the first decode attempt can fail. The loader retries a bounded
//! number of times and normalizes whatever it decodes to 8-bit RGB.

use image::{DynamicImage, ImageReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::LoaderConfig;
use crate::{Result, SnapSightError};

/// Source of decoded images
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage>;
}

/// Decode a file, sniffing the format from its contents rather than its
/// extension
pub fn decode_file(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Decodes straight from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDecoder;

impl ImageDecoder for FsDecoder {
    fn decode(&self, path: &Path) -> image::ImageResult<DynamicImage> {
        decode_file(path)
    }
}

/// Attempt budget and spacing between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Multiplier applied to `delay` after each failed attempt; 1.0 keeps it constant
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay, backoff_factor: 1.0 }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.delay.mul_f64(self.backoff_factor.powi(exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::constant(3, Duration::from_millis(500))
    }
}

impl From<&LoaderConfig> for RetryPolicy {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
            backoff_factor: config.backoff_factor.max(1.0),
        }
    }
}

pub struct ImageLoader {
    decoder: Arc<dyn ImageDecoder>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl ImageLoader {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            decoder: Arc::new(FsDecoder),
            clock: Arc::new(SystemClock),
            policy,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Decode `path` as RGB, retrying on failure.
    ///
    /// Returns [`SnapSightError::UnreadableImage`] after exactly
    /// `max_attempts` failed decodes. Callers skip the capture on that error.
    pub async fn load(&self, path: &Path) -> Result<DynamicImage> {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.decoder.decode(path) {
                Ok(img) => {
                    if attempt > 1 {
                        debug!("Decoded {:?} on attempt {}", path, attempt);
                    }
                    return Ok(DynamicImage::ImageRgb8(img.to_rgb8()));
                }
                Err(e) => {
                    debug!("Attempt {}/{} to decode {:?} failed: {}", attempt, max_attempts, path, e);
                    if attempt < max_attempts {
                        self.clock.sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        warn!("Giving up on {:?} after {} attempts", path, max_attempts);
        Err(SnapSightError::UnreadableImage {
            path: path.to_path_buf(),
            attempts: max_attempts,
        })
    }
}
