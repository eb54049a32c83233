//! Child-process isolation for the thumbnail codec.
//!
//! The decoder handles arbitrary third-party bytes, so it never runs in the
//! pipeline process: the parent re-executes its own binary with the
//! `thumbnail-worker` subcommand, hands the bytes over stdin, and trusts
//! nothing but the exit status. A crashed or killed child is an ordinary
//! per-item failure.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use crate::error::Result;
use crate::thumbnail;

/// Parent-side handle for running the codec out of process.
#[derive(Debug, Clone)]
pub struct ThumbnailSandbox {
    worker_exe: PathBuf,
    width: u32,
    height: u32,
    out_size: usize,
}

impl ThumbnailSandbox {
    /// Sandbox re-executing the current binary.
    pub fn new() -> Result<Self> {
        Ok(Self::with_worker(std::env::current_exe()?))
    }

    /// Sandbox spawning an explicit worker binary (used by tests).
    pub fn with_worker(worker_exe: PathBuf) -> Self {
        Self {
            worker_exe,
            width: thumbnail::THUMBNAIL_WIDTH,
            height: thumbnail::THUMBNAIL_HEIGHT,
            out_size: thumbnail::THUMBNAIL_OUT_SIZE,
        }
    }

    /// Run the codec on `image_bytes` in a child process.
    ///
    /// On success the child has written `cache_path + ".pad"`; on decoder
    /// failure it has written the original bytes to `cache_path +
    /// ".failed"`. Returns whether the child exited cleanly.
    pub async fn resize_and_pad(&self, image_bytes: &[u8], cache_path: &Path) -> Result<bool> {
        if let Some(parent) = cache_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut child = Command::new(&self.worker_exe)
            .arg("thumbnail-worker")
            .arg("--width")
            .arg(self.width.to_string())
            .arg("--height")
            .arg(self.height.to_string())
            .arg("--out-size")
            .arg(self.out_size.to_string())
            .arg("--cache-path")
            .arg(cache_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(image_bytes).await.is_err() {
                // Child died before consuming its input.
                let _ = child.wait().await;
                return Ok(false);
            }
        }

        let status = child.wait().await?;
        Ok(status.success())
    }
}

/// Child-process entry point for the `thumbnail-worker` subcommand.
///
/// Reads the image bytes from stdin and performs the resize-and-pad. The
/// only protocol with the parent is the exit status and the artifacts on
/// disk.
pub fn run_thumbnail_worker(width: u32, height: u32, out_size: usize, cache_path: &str) -> ExitCode {
    let mut input = Vec::new();
    if std::io::stdin().read_to_end(&mut input).is_err() {
        return ExitCode::FAILURE;
    }

    match thumbnail::resize_and_pad(&input, width, height, out_size) {
        Ok(padded) => match std::fs::write(format!("{cache_path}.pad"), padded) {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        },
        Err(err) => {
            warn!(
                "resize_and_pad failed (length={}, width={width}, height={height}, \
                 size={out_size}): {cache_path}.failed -- {err}",
                input.len()
            );
            let _ = std::fs::write(format!("{cache_path}.failed"), &input);
            ExitCode::FAILURE
        }
    }
}
