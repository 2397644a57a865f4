use bytes::Bytes;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::naming::image_file_name;
use crate::error::{GenerationError, Result};
use crate::models::WorkItem;

pub const JPEG_QUALITY: u8 = 95;

/// Decodes `bytes` and writes them as a JPEG into `dir`. Returns the
/// absolute path of the new file. Never replaces an existing file.
pub async fn save_jpeg(bytes: Bytes, dir: &Path, item: WorkItem<'_>) -> Result<PathBuf> {
    let path = dir.join(image_file_name(item.model, item.attempt, &Local::now()));
    let target = path.clone();

    tokio::task::spawn_blocking(move || write_jpeg(&bytes, &target))
        .await
        .map_err(|e| GenerationError::Internal(format!("Image writer task failed: {}", e)))??;

    Ok(tokio::fs::canonicalize(&path).await.unwrap_or(path))
}

fn write_jpeg(bytes: &[u8], target: &Path) -> Result<()> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();

    let file = OpenOptions::new().write(true).create_new(true).open(target)?;
    let mut writer = BufWriter::new(file);
    let encoded = encode(&rgb, &mut writer);
    drop(writer);

    if encoded.is_err() {
        let _ = fs::remove_file(target);
    }
    encoded
}

fn encode<W: Write>(rgb: &image::RgbImage, writer: &mut W) -> Result<()> {
    JpegEncoder::new_with_quality(&mut *writer, JPEG_QUALITY).encode_image(rgb)?;
    writer.flush()?;
    Ok(())
}
