// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Tesseract OCR via its command-line interface

use async_trait::async_trait;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::process::{Command as StdCommand, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::OcrEngine;
use crate::config::OcrConfig;
use crate::{Result, SnapSightError};

/// Shells out to `tesseract stdin stdout --oem <n> --psm <n>`
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    oem: u8,
    psm: u8,
    language: Option<String>,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>) -> Self {
        let defaults = OcrConfig::default();
        Self {
            command: command.into(),
            oem: defaults.oem,
            psm: defaults.psm,
            language: None,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            oem: config.oem,
            psm: config.psm,
            language: config.language.clone(),
        }
    }

    /// Check if the tesseract binary is on PATH
    pub fn available(&self) -> bool {
        StdCommand::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments after the binary name
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--oem".to_string(),
            self.oem.to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
        ];
        if let Some(ref lang) = self.language {
            args.push("-l".to_string());
            args.push(lang.clone());
        }
        args
    }

    fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::from_config(&OcrConfig::default())
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn recognize(&self, image: &GrayImage) -> Result<String> {
        let png = Self::encode_png(image)?;
        debug!("Invoking {} {:?} ({} bytes)", self.command, self.args(), png.len());

        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SnapSightError::Ocr(format!("Failed to start {}: {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SnapSightError::Ocr("tesseract stdin unavailable".to_string()))?;
        stdin.write_all(&png).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("tesseract exited with {}: {}", output.status, stderr.trim());
            return Err(SnapSightError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
