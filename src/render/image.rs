//! Inline image attachments
//!
//! Images arrive as base64 payloads next to a response. They render as a
//! fixed-width block with hover controls (download, delete) and open in a
//! full-screen overlay on click. Actions produce `ImageEffect`s; the
//! caller performs them, including clearing the payload from history.

use super::escape_html;
use crate::error::{ChatpaneError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Width of the inline image block in pixels
pub const IMAGE_WIDTH_PX: u32 = 400;

/// Largest share of the viewport the overlay image may take, in percent
pub const OVERLAY_MAX_PERCENT: u32 = 90;

/// Class attribute that marks the root of an image block
pub const IMAGE_BLOCK_MARKER: &str = r#"class="message-image""#;

/// A base64 image carried by a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data: String,
}

impl ImageAttachment {
    /// Wrap a base64 payload
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    /// The payload exactly as stored
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Decode the payload
    ///
    /// # Errors
    ///
    /// Returns `ChatpaneError::Image` if the payload is not valid base64
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| ChatpaneError::Image(format!("Invalid image payload: {}", e)).into())
    }

    /// Sniff the image format from the decoded bytes
    fn format(&self) -> Option<ImageFormat> {
        let bytes = self.decode().ok()?;
        image::guess_format(&bytes).ok()
    }

    /// MIME type for the data URI, `image/jpeg` when the format is unknown
    pub fn mime_type(&self) -> &'static str {
        self.format()
            .map(|f| f.to_mime_type())
            .unwrap_or("image/jpeg")
    }

    /// File extension for downloads, `jpg` when the format is unknown
    pub fn extension(&self) -> &'static str {
        self.format()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("jpg")
    }

    /// Data URI suitable for an `src` attribute
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.data.trim())
    }

    /// Timestamped download name, e.g. `generated-image-1700000000000.png`
    pub fn download_filename(&self, now: DateTime<Utc>) -> String {
        format!(
            "generated-image-{}.{}",
            now.timestamp_millis(),
            self.extension()
        )
    }

    /// Decode and write the image into `dir` under its download name
    pub fn save_to(&self, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
        let bytes = self.decode()?;
        let path = dir.join(self.download_filename(now));
        std::fs::write(&path, bytes)?;
        tracing::info!("Saved image to {}", path.display());
        Ok(path)
    }

    /// Inline block with hover-revealed download and delete controls
    pub fn to_html(&self) -> String {
        let src = escape_html(&self.data_uri());
        format!(
            concat!(
                r#"<div class="message-image">"#,
                r#"<div class="image-wrapper" style="position: relative; width: {width}px; margin: 10px 0;">"#,
                r#"<img src="{src}" alt="Generated Image" style="width: 100%; height: auto; border-radius: 8px; cursor: pointer;">"#,
                r#"<div class="image-controls">"#,
                r#"<button class="image-control-btn" data-action="download" title="Download Image">💾</button>"#,
                r#"<button class="image-control-btn" data-action="delete" title="Delete Image">🗑️</button>"#,
                "</div></div></div>"
            ),
            width = IMAGE_WIDTH_PX,
            src = src,
        )
    }

    /// Full-screen overlay showing the image; any click dismisses it
    pub fn overlay_html(&self) -> String {
        format!(
            concat!(
                r#"<div class="image-overlay" data-action="dismiss" style="position: fixed; top: 0; left: 0; width: 100%; height: 100%; "#,
                r#"background-color: rgba(0,0,0,0.9); display: flex; justify-content: center; align-items: center; z-index: 1000;">"#,
                r#"<img src="{src}" style="max-width: {max}%; max-height: {max}%; object-fit: contain;">"#,
                "</div>"
            ),
            src = escape_html(&self.data_uri()),
            max = OVERLAY_MAX_PERCENT,
        )
    }
}

/// User interaction with an image block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    /// Click on the inline image
    Open,
    /// Click anywhere on the overlay
    Dismiss,
    /// Download control
    Download,
    /// Delete control, after the confirmation prompt
    Delete {
        /// Whether the user confirmed the deletion
        confirmed: bool,
    },
}

/// What the presenter has to do in response to an `ImageAction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEffect {
    /// Show the overlay markup
    ShowOverlay(String),
    /// Remove the overlay
    HideOverlay,
    /// Save the image under the given file name
    Save {
        /// Suggested file name
        filename: String,
    },
    /// Remove the image block and clear this payload from the chat's history
    Remove {
        /// Payload to clear
        image_data: String,
    },
    /// Nothing to do
    None,
}

/// Interaction state of one rendered image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    attachment: ImageAttachment,
    overlay_open: bool,
    removed: bool,
}

impl ImageView {
    /// Start tracking a freshly rendered attachment
    pub fn new(attachment: ImageAttachment) -> Self {
        Self {
            attachment,
            overlay_open: false,
            removed: false,
        }
    }

    /// The attachment being shown
    pub fn attachment(&self) -> &ImageAttachment {
        &self.attachment
    }

    /// Whether the overlay is open
    pub fn overlay_open(&self) -> bool {
        self.overlay_open
    }

    /// Whether the image was deleted from view
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Apply a user action
    pub fn handle(&mut self, action: ImageAction, now: DateTime<Utc>) -> ImageEffect {
        if self.removed {
            return ImageEffect::None;
        }

        match action {
            ImageAction::Open if !self.overlay_open => {
                self.overlay_open = true;
                ImageEffect::ShowOverlay(self.attachment.overlay_html())
            }
            ImageAction::Dismiss if self.overlay_open => {
                self.overlay_open = false;
                ImageEffect::HideOverlay
            }
            ImageAction::Download => ImageEffect::Save {
                filename: self.attachment.download_filename(now),
            },
            ImageAction::Delete { confirmed: true } => {
                self.removed = true;
                self.overlay_open = false;
                ImageEffect::Remove {
                    image_data: self.attachment.data().to_string(),
                }
            }
            _ => ImageEffect::None,
        }
    }
}
