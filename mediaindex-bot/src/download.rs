//! Partial media downloads into the scratch directory.

use std::path::Path;

use anyhow::{Context, Result, bail};
use mediaindex_sdk::client::{Bot, with_flood_retry};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MIB: u64 = 1024 * 1024;

/// A downloaded prefix of a media file. The file is removed on drop.
#[derive(Debug)]
pub struct TempMedia {
    file: NamedTempFile,
    pub bytes: u64,
}

impl TempMedia {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Extension of `file_name` with its dot, or `.tmp`.
pub fn temp_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| ".tmp".to_string())
}

pub fn scratch_file(scratch_dir: &Path, file_name: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("media-")
        .suffix(&temp_suffix(file_name))
        .tempfile_in(scratch_dir)
        .with_context(|| format!("Cannot create temp file in {}", scratch_dir.display()))
}

/// Fetch the first `size_mb` MiB of a file.
///
/// A local Bot API server reports absolute file paths; those are read from
/// disk instead of over HTTP.
pub async fn download_partial(
    bot: &Bot,
    file_id: &str,
    file_name: &str,
    scratch_dir: &Path,
    size_mb: u64,
) -> Result<TempMedia> {
    let max_bytes = size_mb * MIB;
    let remote = with_flood_retry(|| bot.get_file(file_id))
        .await
        .with_context(|| format!("getFile failed for {file_name}"))?;
    let file_path = remote
        .file_path
        .with_context(|| format!("No download path for {file_name}"))?;

    let file = scratch_file(scratch_dir, file_name)?;
    let bytes = if Path::new(&file_path).is_absolute() {
        copy_prefix(Path::new(&file_path), file.path(), max_bytes).await?
    } else {
        bot.download_file_range(&file_path, max_bytes, file.path())
            .await
            .with_context(|| format!("Download failed for {file_name}"))?
    };

    if bytes == 0 {
        bail!("Download of {file_name} returned no data");
    }
    tracing::debug!(file = file_name, bytes, size_mb, "Partial download ready");
    Ok(TempMedia { file, bytes })
}

async fn copy_prefix(src: &Path, dest: &Path, max_bytes: u64) -> Result<u64> {
    let source = tokio::fs::File::open(src)
        .await
        .with_context(|| format!("Cannot open {}", src.display()))?;
    let mut limited = source.take(max_bytes);
    let mut out = tokio::fs::File::create(dest).await?;
    let copied = tokio::io::copy(&mut limited, &mut out).await?;
    out.flush().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_follows_extension() {
        assert_eq!(temp_suffix("Show.S01E01.mkv"), ".mkv");
        assert_eq!(temp_suffix("clip.MP4"), ".MP4");
        assert_eq!(temp_suffix("noext"), ".tmp");
        assert_eq!(temp_suffix("trailing."), ".tmp");
    }

    #[test]
    fn scratch_files_live_in_the_scratch_dir_and_vanish() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let file = scratch_file(dir.path(), "a.mkv").unwrap();
            assert!(file.path().starts_with(dir.path()));
            assert_eq!(file.path().extension().unwrap(), "mkv");
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn local_prefix_copy_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        std::fs::write(&src, vec![1u8; 100]).unwrap();
        let dest = dir.path().join("dest.bin");
        assert_eq!(copy_prefix(&src, &dest, 40).await.unwrap(), 40);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 40);
    }
}
