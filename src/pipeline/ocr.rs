//! Turns a receipt image into text. Strategies are tried in order and the first one that produces
//! non-empty text wins. Every failure along the way is kept so the caller can see why.

use crate::llm::{CompletionRequest, ImagePart, Llm};
use crate::pipeline::error::{StrategyFailure, VisionError};
use crate::pipeline::{call_model, StageSettings};
use crate::Result;
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const VISION_PROMPT: &str = "Transcribe all of the text on this receipt, line by line, exactly as \
printed. Include the merchant name, the date and every amount, especially the total. Return only \
the transcribed text.";

/// The image formats a receipt can be uploaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Guesses the format from a file extension such as `jpg`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// True if `bytes` start with this format's magic number.
    fn matches(&self, bytes: &[u8]) -> bool {
        match self {
            ImageFormat::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            ImageFormat::Png => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            ImageFormat::Gif => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
            ImageFormat::Webp => {
                bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP"
            }
        }
    }
}

/// A receipt image that has passed the format and size checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl ImageInput {
    /// Checks `bytes` against the declared `mime_type` with the default size limit.
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> std::result::Result<Self, VisionError> {
        Self::with_limit(bytes, mime_type, DEFAULT_MAX_IMAGE_BYTES)
    }

    pub fn with_limit(
        bytes: Vec<u8>,
        mime_type: &str,
        max_bytes: usize,
    ) -> std::result::Result<Self, VisionError> {
        let format = ImageFormat::from_mime(mime_type)
            .ok_or_else(|| VisionError::UnsupportedFormat(mime_type.to_string()))?;
        if bytes.is_empty() {
            return Err(VisionError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(VisionError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        if !format.matches(&bytes) {
            return Err(VisionError::ContentMismatch(format.mime_type().to_string()));
        }
        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// One way of reading text from an image.
#[async_trait::async_trait]
pub trait OcrStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn read_text(&self, image: &ImageInput) -> Result<String>;
}

/// The strategies that can be named in configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// The local `tesseract` binary.
    Tesseract,
    /// The hosted vision model.
    Vision,
}

serde_plain::derive_display_from_serialize!(StrategyKind);
serde_plain::derive_fromstr_from_deserialize!(StrategyKind);

impl StrategyKind {
    pub fn default_order() -> Vec<StrategyKind> {
        vec![StrategyKind::Tesseract, StrategyKind::Vision]
    }
}

/// Runs `tesseract stdin stdout`, feeding the image on stdin.
pub struct TesseractOcr {
    program: PathBuf,
}

impl TesseractOcr {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait::async_trait]
impl OcrStrategy for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn read_text(&self, image: &ImageInput) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .context("tesseract stdin was not captured")?;
        stdin
            .write_all(image.bytes())
            .await
            .context("failed to send the image to tesseract")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for tesseract")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Asks a vision-capable model to transcribe the image.
pub struct VisionOcr {
    llm: Arc<dyn Llm>,
    settings: StageSettings,
    timeout: Duration,
}

impl VisionOcr {
    pub fn new(llm: Arc<dyn Llm>, settings: StageSettings, timeout: Duration) -> Self {
        Self {
            llm,
            settings,
            timeout,
        }
    }

    fn request(&self, image: &ImageInput) -> CompletionRequest {
        CompletionRequest {
            system: "You read receipts.".to_string(),
            user: VISION_PROMPT.to_string(),
            image: Some(ImagePart {
                mime_type: image.mime_type().to_string(),
                data: image.bytes().to_vec(),
            }),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_output: false,
        }
    }
}

#[async_trait::async_trait]
impl OcrStrategy for VisionOcr {
    fn name(&self) -> &str {
        "vision"
    }

    async fn read_text(&self, image: &ImageInput) -> Result<String> {
        let text = call_model(self.llm.as_ref(), &self.request(image), self.timeout).await?;
        Ok(text)
    }
}

/// Runs OCR strategies in order until one of them returns text.
pub struct ReceiptReader {
    strategies: Vec<Box<dyn OcrStrategy>>,
    timeout: Duration,
}

impl ReceiptReader {
    /// `timeout` bounds each strategy separately.
    pub fn new(strategies: Vec<Box<dyn OcrStrategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
        }
    }

    /// Builds the configured strategies in the given order.
    pub fn from_kinds(
        kinds: &[StrategyKind],
        tesseract: &Path,
        vision_llm: Arc<dyn Llm>,
        vision_settings: StageSettings,
        timeout: Duration,
    ) -> Self {
        let strategies = kinds
            .iter()
            .map(|kind| -> Box<dyn OcrStrategy> {
                match kind {
                    StrategyKind::Tesseract => Box::new(TesseractOcr::new(tesseract)),
                    StrategyKind::Vision => Box::new(VisionOcr::new(
                        vision_llm.clone(),
                        vision_settings,
                        timeout,
                    )),
                }
            })
            .collect();
        Self::new(strategies, timeout)
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn extract_text(&self, image: &ImageInput) -> std::result::Result<String, VisionError> {
        if self.strategies.is_empty() {
            return Err(VisionError::NoStrategies);
        }
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            debug!("Trying OCR strategy {}", strategy.name());
            let outcome = match tokio::time::timeout(self.timeout, strategy.read_text(image)).await
            {
                Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
                Ok(Ok(_)) => Err(anyhow!("no text recognized")),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(anyhow!("timed out after {}s", self.timeout.as_secs())),
            };
            match outcome {
                Ok(text) => {
                    info!(
                        "OCR strategy {} read {} characters",
                        strategy.name(),
                        text.chars().count()
                    );
                    return Ok(text.trim().to_string());
                }
                Err(e) => {
                    warn!("OCR strategy {} failed: {e:#}", strategy.name());
                    failures.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        Err(VisionError::AllStrategiesFailed(failures))
    }
}
