//! Remote audio acquisition using yt-dlp.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::command::ToolCommand;
use crate::error::{MediaError, MediaResult};
use crate::executor::CommandExecutor;

/// Downloads the best audio track of a remote URL as MP3.
#[derive(Clone)]
pub struct AudioDownloader {
    executor: Arc<dyn CommandExecutor>,
}

impl AudioDownloader {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Download into `dir` under file stem `stem`.
    ///
    /// yt-dlp picks the final extension itself, so the written file is
    /// located afterwards by its stem.
    pub async fn download_audio(&self, url: &str, dir: &Path, stem: &str) -> MediaResult<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;

        let template = dir.join(format!("{}.%(ext)s", stem));
        info!(url, dir = %dir.display(), "Downloading external audio");

        let command = ToolCommand::yt_dlp()
            .args([
                "--no-playlist",
                "--no-progress",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "0",
                "-o",
            ])
            .path(&template)
            .arg(url);

        self.executor.execute(command).await.map_err(|e| match e {
            MediaError::ExternalTool { stderr, .. } => {
                let reason = stderr
                    .as_deref()
                    .and_then(|s| s.lines().rev().find(|l| !l.trim().is_empty()))
                    .unwrap_or("yt-dlp exited with non-zero status")
                    .to_string();
                MediaError::download_failed(reason)
            }
            other => other,
        })?;

        let downloaded = find_by_stem(dir, stem).await?.ok_or_else(|| {
            MediaError::download_failed(format!("no file named {}.* after download", stem))
        })?;

        info!(path = %downloaded.display(), "External audio downloaded");
        Ok(downloaded)
    }
}

/// First non-partial file in `dir` whose stem is `stem`.
pub async fn find_by_stem(dir: &Path, stem: &str) -> MediaResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut matches = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_partial = path
            .extension()
            .is_some_and(|e| e == "part" || e == "ytdl" || e == "temp");
        if is_partial || !path.is_file() {
            continue;
        }
        if path.file_stem().is_some_and(|s| s == stem) {
            matches.push(path);
        }
    }

    // prefer the requested format when several remain
    matches.sort_by_key(|p| p.extension().map_or(true, |e| e != "mp3"));
    Ok(matches.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Tool;
    use crate::testing::FakeExecutor;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_download_locates_file_by_stem() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeExecutor::new());
        let downloader = AudioDownloader::new(fake.clone());

        let path = downloader
            .download_audio("https://example.com/watch?v=1", dir.path(), "external_audio")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("external_audio.mp3"));

        let calls = fake.calls_for(Tool::YtDlp);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].has_pair("--audio-format", "mp3"));
        assert!(calls[0].mentions("%(ext)s"));
    }

    #[tokio::test]
    async fn test_download_failure_reports_last_stderr_line() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeExecutor::new().fail_when(Tool::YtDlp, "example.com"));
        let downloader = AudioDownloader::new(fake);

        let err = downloader
            .download_audio("https://example.com/x", dir.path(), "external_audio")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_find_by_stem_skips_partials() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("song.webm.part"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("song.m4a"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("song.mp3"), b"x").await.unwrap();
        tokio::fs::write(dir.path().join("other.mp3"), b"x").await.unwrap();

        let found = find_by_stem(dir.path(), "song").await.unwrap();
        assert_eq!(found, Some(dir.path().join("song.mp3")));
        assert_eq!(find_by_stem(dir.path(), "missing").await.unwrap(), None);
    }
}
