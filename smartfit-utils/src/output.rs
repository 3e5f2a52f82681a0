//! Writing composites to disk.

use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use log::debug;
use tempfile::NamedTempFile;

/// Encode `image` and place it at `destination` atomically.
///
/// The encoded bytes go to a temporary file beside the destination and are
/// renamed into place only once fully written, so a failure never leaves a
/// truncated file at `destination`. The format follows the file extension and
/// defaults to PNG when the extension is missing or unknown.
pub fn save_image(image: &RgbImage, destination: &Path) -> Result<()> {
    let parent = match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let format = ImageFormat::from_path(destination).unwrap_or(ImageFormat::Png);
    debug!(
        "saving {}x{} composite to {} as {:?}",
        image.width(),
        image.height(),
        destination.display(),
        format
    );

    let encoded = encode(image, format)?;
    let staging = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage output in {}", parent.display()))?;
    {
        let mut writer = BufWriter::new(staging.as_file());
        writer
            .write_all(&encoded)
            .with_context(|| format!("failed to write {}", destination.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", destination.display()))?;
    }
    staging
        .persist(destination)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to move output into {}", destination.display()))?;
    Ok(())
}

fn encode(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .with_context(|| format!("failed to encode {format:?}"))?;
    Ok(cursor.into_inner())
}
