use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    FaceDetector,
    FaceLandmarker,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::FaceDetector, ModelKind::FaceLandmarker];

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "face detector",
            ModelKind::FaceLandmarker => "face landmarker",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "face_detection_short_range.onnx",
            ModelKind::FaceLandmarker => "face_landmark_with_attention.onnx",
        }
    }

    fn url_env(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "FACE_CELLS_DETECTOR_URL",
            ModelKind::FaceLandmarker => "FACE_CELLS_LANDMARK_URL",
        }
    }
}

/// Where a model lives on disk and, optionally, where to fetch it from.
#[derive(Clone, Debug)]
pub struct ModelSource {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub url: Option<String>,
}

impl ModelSource {
    pub fn new(kind: ModelKind, models_dir: &Path, url: Option<String>) -> Self {
        Self {
            kind,
            path: models_dir.join(kind.file_name()),
            url,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure `source.path` exists, downloading it when a URL is configured.
/// Events are forwarded to `on_event` and mirrored on a terminal progress bar.
pub fn ensure_model_ready<F>(source: &ModelSource, mut on_event: F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    let model = source.kind;
    if source.path.is_file() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    let Some(url) = source.url.as_deref() else {
        bail!(
            "{} model not found at {} and no download URL configured (pass --{}-model-url or set {})",
            model.label(),
            source.path.display(),
            match model {
                ModelKind::FaceDetector => "detector",
                ModelKind::FaceLandmarker => "landmark",
            },
            model.url_env()
        );
    };

    if let Some(parent) = source.path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(model, url, &source.path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { model } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| format!("failed to download {} model", model.label()))
}

fn download_to_path<F>(model: ModelKind, url: &str, dest: &Path, on_event: &mut F) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!("downloading {} model from {url} to {}", model.label(), dest.display());

    let mut response = Client::new()
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total = response.content_length();
    on_event(ModelDownloadEvent::Started { model, total });

    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .context("failed while writing model to disk")?;
        downloaded += read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    drop(file);
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

fn create_progress_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} downloading model")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
