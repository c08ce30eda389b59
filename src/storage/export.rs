//! Export storage for finished images

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, Result};

const JPEG_QUALITY: u8 = 95;

/// Encoding of an exported file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    /// `jpg`/`jpeg` select JPEG, anything else PNG
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            _ => Self::Png,
        }
    }
}

/// Files saved for download, one flat directory
pub struct ExportStore {
    dir: PathBuf,
}

impl ExportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            debug!(path = ?self.dir, "Created export directory");
        }
        Ok(())
    }

    /// Save `image` as `<8-char id>_<filename>` and return the stored name
    pub async fn save(&self, image: &DynamicImage, filename: &str, format: ExportFormat) -> Result<String> {
        check_name(filename)?;
        self.ensure_dir().await?;

        let bytes = encode(image, format)?;
        let id = Uuid::new_v4().simple().to_string();
        let stored = format!("{}_{}", &id[..8], filename);
        let path = self.dir.join(&stored);

        fs::write(&path, &bytes).await?;
        debug!(path = ?path, size = bytes.len(), "Saved export");

        Ok(stored)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        check_name(name)?;
        match fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("File not found: {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every stored export; returns how many were removed
    pub async fn cleanup_all(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && fs::remove_file(entry.path()).await.is_ok() {
                deleted += 1;
            }
        }

        info!(deleted, "Cleaned up exports");
        Ok(deleted)
    }
}

/// Reject names that could escape the export directory
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(AppError::InvalidRequest(format!("Invalid file name: {}", name)));
    }
    Ok(())
}

fn encode(image: &DynamicImage, format: ExportFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Png => image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?,
        ExportFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY))?,
    }
    Ok(bytes)
}
