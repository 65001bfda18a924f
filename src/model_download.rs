use std::{
    fs,
    io::{Read, Write},
    path::Path,
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    PalmDetector,
    HandposeEstimator,
}

const HANDPOSE_ESTIMATOR_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/handpose_estimation_mediapipe_2023feb.onnx";
const PALM_DETECTOR_MODEL_URL: &str = "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models/palm_detection_mediapipe_2023feb.onnx";

impl ModelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::PalmDetector => "palm detector",
            ModelKind::HandposeEstimator => "handpose estimator",
        }
    }

    fn url(&self) -> &'static str {
        match self {
            ModelKind::PalmDetector => PALM_DETECTOR_MODEL_URL,
            ModelKind::HandposeEstimator => HANDPOSE_ESTIMATOR_MODEL_URL,
        }
    }
}

/// Makes sure `model_path` exists, downloading the public model when allowed.
pub fn ensure_model_ready(
    model: ModelKind,
    model_path: &Path,
    download: bool,
) -> anyhow::Result<()> {
    if model_path.exists() {
        return Ok(());
    }
    if !download {
        bail!(
            "{} model not found at {} and downloads are disabled",
            model.label(),
            model_path.display()
        );
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(model, model_path)
        .with_context(|| format!("failed to download {} model", model.label()))
}

fn download_to_path(model: ModelKind, dest: &Path) -> anyhow::Result<()> {
    let url = model.url();
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());
    write_atomically(&mut response, dest, &progress)?;

    progress.finish_with_message(format!("{} model ready", model.label()));
    Ok(())
}

/// Streams `source` into a temp file next to `dest`, then moves it into place.
/// The temp file is removed if anything fails on the way.
fn write_atomically(
    source: &mut impl Read,
    dest: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let tmp_path = dest.with_extension("download");
    let result = stream_into(source, &tmp_path, progress).and_then(|()| {
        fs::rename(&tmp_path, dest).with_context(|| {
            format!(
                "failed to move temp model {} into place at {}",
                tmp_path.display(),
                dest.display()
            )
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn stream_into(
    source: &mut impl Read,
    tmp_path: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = source
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} downloading model") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_model_needs_no_download() {
        let file = tempfile::NamedTempFile::new().unwrap();
        ensure_model_ready(ModelKind::PalmDetector, file.path(), false).unwrap();
    }

    struct BrokenStream {
        served: bool,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::other("connection reset"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"onnx");
            Ok(4)
        }
    }

    #[test]
    fn interrupted_download_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("palm.onnx");

        let mut source = BrokenStream { served: false };
        let err = write_atomically(&mut source, &dest, &ProgressBar::hidden()).unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"));
        assert!(!dest.exists());
        assert!(!dest.with_extension("download").exists());
    }

    #[test]
    fn completed_download_is_moved_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("palm.onnx");

        let mut source: &[u8] = b"model bytes";
        write_atomically(&mut source, &dest, &ProgressBar::hidden()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"model bytes");
        assert!(!dest.with_extension("download").exists());
    }

    #[test]
    fn offline_mode_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handpose.onnx");
        let err = ensure_model_ready(ModelKind::HandposeEstimator, &path, false).unwrap_err();
        assert!(err.to_string().contains("handpose estimator"));
        assert!(!path.exists());
    }
}
