//! Asynchronous transcode of compressed synthesis output to the wire
//! format.
//!
//! Shelling out to `ffmpeg` keeps the decode off the async executor; the
//! child reads the compressed audio on stdin and writes raw µ-law 8 kHz
//! mono on stdout. Stdin is fed from a spawned task so a full stdout pipe
//! cannot deadlock the writer.

use crate::AudioError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Timeout for one transcode invocation.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Converts compressed audio (MP3 from the synthesis vendor) to raw
/// µ-law 8 kHz mono bytes.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_binary: PathBuf,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Transcoder {
    pub fn new(ffmpeg_binary: impl AsRef<Path>) -> Self {
        Self {
            ffmpeg_binary: ffmpeg_binary.as_ref().to_path_buf(),
        }
    }

    /// Transcodes `compressed` to raw µ-law 8 kHz mono.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Transcode` if the decoder cannot be spawned or
    /// exits nonzero, and `AudioError::TranscodeTimeout` if it exceeds the
    /// 10 second budget.
    pub async fn to_mulaw_8k(&self, compressed: &[u8]) -> Result<Vec<u8>, AudioError> {
        if compressed.is_empty() {
            return Ok(Vec::new());
        }

        let mut child = Command::new(&self.ffmpeg_binary)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg("pipe:0")
            .arg("-f")
            .arg("mulaw")
            .arg("-ar")
            .arg("8000")
            .arg("-ac")
            .arg("1")
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AudioError::Transcode(format!("failed to spawn ffmpeg: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AudioError::Transcode("failed to open ffmpeg stdin".to_string()))?;
        let input = compressed.to_vec();

        // Feed stdin from a task so a full output buffer cannot deadlock us.
        let write_task = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(TRANSCODE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| AudioError::TranscodeTimeout(TRANSCODE_TIMEOUT.as_secs()))?
            .map_err(|e| AudioError::Transcode(format!("failed to wait for ffmpeg: {e}")))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Broken pipe is expected if ffmpeg bailed early; the exit
                // status below carries the real diagnosis.
                tracing::debug!(error = %e, "ffmpeg stdin write ended early");
            }
            Err(e) => {
                return Err(AudioError::Transcode(format!("stdin task failed: {e}")));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::Transcode(format!("ffmpeg failed: {stderr}")));
        }

        Ok(output.stdout)
    }
}
