// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job requests read from stdin and their dispatch to the compositor.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{Local, NaiveDate};
use gridsheet_core::SheetConfig;
use gridsheet_core::error::{GridsheetError, Result};
use gridsheet_core::types::{CancelToken, Generation, Phase, Section, Timing};
use gridsheet_render::source::{filter_supported, scan_folder, scan_tree, sort_by_file_name};
use gridsheet_render::{Compositor, LayoutConfig};
use serde::Deserialize;
use tracing::info;

use crate::protocol::{self, Message};

/// One contact-sheet job as sent by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub config: SheetConfig,
    /// Title override; defaults to the input folder's name.
    #[serde(default)]
    pub title: Option<String>,
    /// Draw no title at all.
    #[serde(default)]
    pub no_title: bool,
    /// Output file (or directory, for per-folder jobs).
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Emit `timing` lines for each phase and the whole job.
    #[serde(default)]
    pub benchmark: bool,
    pub mode: JobMode,
}

/// Where the images come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Scan a folder, optionally including subfolders.
    Folder {
        input_dir: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
    /// An explicit file list. `input_dir` only supplies the default title
    /// and output location.
    Files {
        files: Vec<PathBuf>,
        #[serde(default)]
        input_dir: Option<PathBuf>,
    },
    /// One section per folder, in one document or one document each.
    Sections {
        sections: Vec<Section>,
        #[serde(default)]
        per_folder: bool,
    },
}

/// Run `request`, streaming progress lines to stdout.
pub async fn run(request: JobRequest, cancel: CancelToken) -> Result<Generation<Message>> {
    let started = Instant::now();
    let benchmark = request.benchmark;
    let layout = LayoutConfig::new(&request.config)?;
    let mut compositor = Compositor::new(layout)
        .with_cancel_token(cancel)
        .on_progress(|progress| protocol::emit(&Message::from(progress)));
    if benchmark {
        compositor = compositor.on_timing(|timing| protocol::emit(&Message::from(timing)));
    }

    let outcome = execute(&mut compositor, request, Local::now().date_naive()).await?;
    if benchmark && !outcome.is_cancelled() {
        protocol::emit(&Message::from(&Timing {
            phase: Phase::Total,
            elapsed: started.elapsed(),
        }));
    }
    Ok(outcome)
}

/// Dispatch `request` on an already configured compositor. `today` names
/// default output files.
pub async fn execute(
    compositor: &mut Compositor,
    request: JobRequest,
    today: NaiveDate,
) -> Result<Generation<Message>> {
    match request.mode {
        JobMode::Folder {
            ref input_dir,
            recursive,
        } => {
            if !input_dir.is_dir() {
                return Err(GridsheetError::InvalidConfig(format!(
                    "input directory does not exist: {}",
                    input_dir.display()
                )));
            }

            let started = Instant::now();
            let files = if recursive {
                scan_tree(input_dir)
            } else {
                scan_folder(input_dir)
            };
            compositor.record_timing(Phase::Scan, started);
            if files.is_empty() {
                return Err(GridsheetError::NoImages(format!(
                    "no compatible images found in: {}",
                    input_dir.display()
                )));
            }
            info!(count = files.len(), recursive, "scanned input folder");

            let input_dir = Some(input_dir.as_path());
            let title = resolve_title(&request, input_dir);
            let output = resolve_output(&request, input_dir, &title, today)?;
            let result = compositor.create_pdf(&files, &title, &output).await?;
            Ok(map_finished(result, Message::from))
        }

        JobMode::Files {
            ref files,
            ref input_dir,
        } => {
            let mut files = filter_supported(files.iter().cloned());
            if files.is_empty() {
                return Err(GridsheetError::NoImages(
                    "no compatible images in the provided file list".into(),
                ));
            }
            sort_by_file_name(&mut files);

            let title = resolve_title(&request, input_dir.as_deref());
            let output = resolve_output(&request, input_dir.as_deref(), &title, today)?;
            let result = compositor.create_pdf(&files, &title, &output).await?;
            Ok(map_finished(result, Message::from))
        }

        JobMode::Sections {
            ref sections,
            per_folder,
        } => {
            let output = request.output.clone().ok_or_else(|| {
                GridsheetError::InvalidConfig("output is required for sectioned jobs".into())
            })?;

            if per_folder {
                std::fs::create_dir_all(&output)?;
                let result = compositor.create_per_folder_pdfs(sections, &output).await?;
                Ok(map_finished(result, |multi| Message::done_multi(output, multi)))
            } else {
                let result = compositor.create_sectioned_pdf(sections, &output).await?;
                Ok(map_finished(result, Message::from))
            }
        }
    }
}

fn map_finished<T, F>(outcome: Generation<T>, f: F) -> Generation<Message>
where
    F: FnOnce(T) -> Message,
{
    match outcome {
        Generation::Finished(value) => Generation::Finished(f(value)),
        Generation::Cancelled => Generation::Cancelled,
    }
}

/// Explicit title, else nothing when suppressed, else the input folder's
/// name.
pub fn resolve_title(request: &JobRequest, input_dir: Option<&Path>) -> String {
    if request.no_title {
        return String::new();
    }
    if let Some(title) = &request.title {
        return title.clone();
    }
    input_dir.map(folder_name).unwrap_or_default()
}

/// Explicit output, else `{input_dir}/{title}_{YYYY-MM-DD}.pdf`.
pub fn resolve_output(
    request: &JobRequest,
    input_dir: Option<&Path>,
    title: &str,
    today: NaiveDate,
) -> Result<PathBuf> {
    if let Some(output) = &request.output {
        return Ok(output.clone());
    }
    let dir = input_dir.ok_or_else(|| {
        GridsheetError::InvalidConfig("output is required when no input_dir is given".into())
    })?;
    Ok(dir.join(format!("{title}_{}.pdf", today.format("%Y-%m-%d"))))
}

fn folder_name(dir: &Path) -> String {
    let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn request(value: serde_json::Value) -> JobRequest {
        serde_json::from_value(value).unwrap()
    }

    fn write_png(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(40, 30, Rgb([200, 100, 50])).save(path).unwrap();
    }

    fn compositor(config: &SheetConfig) -> Compositor {
        Compositor::new(LayoutConfig::new(config).unwrap())
    }

    #[test]
    fn request_defaults() {
        let req = request(json!({
            "mode": {"folder": {"input_dir": "/photos"}}
        }));
        assert_eq!(req.config, SheetConfig::default());
        assert!(!req.no_title);
        assert!(!req.benchmark);
        assert!(req.output.is_none());
        assert!(matches!(
            req.mode,
            JobMode::Folder { recursive: false, .. }
        ));
    }

    #[test]
    fn sections_request_parses() {
        let req = request(json!({
            "config": {"cols": 3, "landscape": true},
            "output": "/out",
            "mode": {"sections": {
                "sections": [{"folder_path": "/a", "display_name": "Day 1"}],
                "per_folder": true
            }}
        }));
        assert_eq!(req.config.cols, 3);
        assert_eq!(req.config.rows, 3);
        assert!(req.config.landscape);
        match req.mode {
            JobMode::Sections { sections, per_folder } => {
                assert!(per_folder);
                assert_eq!(sections, [Section::new("/a", "Day 1")]);
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn title_resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let shoot = dir.path().join("Shoot 42");
        std::fs::create_dir_all(&shoot).unwrap();

        let mut req = request(json!({"mode": {"folder": {"input_dir": "x"}}}));
        assert_eq!(resolve_title(&req, Some(shoot.as_path())), "Shoot 42");

        req.title = Some("Custom".into());
        assert_eq!(resolve_title(&req, Some(shoot.as_path())), "Custom");

        req.no_title = true;
        assert_eq!(resolve_title(&req, Some(shoot.as_path())), "");
    }

    #[test]
    fn default_output_is_dated_inside_input_dir() {
        let req = request(json!({"mode": {"folder": {"input_dir": "/p"}}}));
        let out = resolve_output(&req, Some(Path::new("/p")), "Trip", today()).unwrap();
        assert_eq!(out, PathBuf::from("/p/Trip_2026-10-18.pdf"));

        assert!(resolve_output(&req, None, "Trip", today()).is_err());
    }

    #[tokio::test]
    async fn folder_job_writes_default_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Holiday");
        for i in 0..3 {
            write_png(&input.join(format!("{i}.png")));
        }

        let req = request(json!({
            "mode": {"folder": {"input_dir": input}}
        }));
        let mut compositor = compositor(&req.config);
        let message = execute(&mut compositor, req, today())
            .await
            .unwrap()
            .finished()
            .unwrap();

        let expected = input.join("Holiday_2026-10-18.pdf");
        assert_eq!(
            message,
            Message::Done {
                output: expected.clone(),
                pages: 1,
                files: None
            }
        );
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn files_job_filters_and_requires_images() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("b.png");
        let b = dir.path().join("A.png");
        write_png(&a);
        write_png(&b);
        let output = dir.path().join("picked.pdf");

        let req = request(json!({
            "output": output,
            "mode": {"files": {"files": [a, "notes.txt", b]}}
        }));
        let mut compositor = compositor(&req.config);
        let message = execute(&mut compositor, req, today())
            .await
            .unwrap()
            .finished()
            .unwrap();
        assert!(matches!(message, Message::Done { pages: 1, .. }));
        assert!(output.exists());

        let req = request(json!({
            "output": output,
            "mode": {"files": {"files": ["notes.txt"]}}
        }));
        let err = execute(&mut compositor, req, today()).await.unwrap_err();
        assert!(matches!(err, GridsheetError::NoImages(_)));
    }

    #[tokio::test]
    async fn sections_job_needs_output() {
        let req = request(json!({
            "mode": {"sections": {"sections": []}}
        }));
        let mut compositor = compositor(&req.config);
        let err = execute(&mut compositor, req, today()).await.unwrap_err();
        assert!(matches!(err, GridsheetError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn per_folder_job_reports_every_file() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("one/x.png"));
        write_png(&dir.path().join("two/y.png"));
        let out_dir = dir.path().join("out");

        let req = request(json!({
            "output": out_dir,
            "mode": {"sections": {
                "sections": [
                    {"folder_path": dir.path().join("one"), "display_name": "One"},
                    {"folder_path": dir.path().join("two"), "display_name": "Two"}
                ],
                "per_folder": true
            }}
        }));
        let mut compositor = compositor(&req.config);
        let message = execute(&mut compositor, req, today())
            .await
            .unwrap()
            .finished()
            .unwrap();

        match message {
            Message::Done {
                output,
                pages,
                files: Some(files),
            } => {
                assert_eq!(output, out_dir);
                assert_eq!(pages, 2);
                assert_eq!(files.len(), 2);
                assert!(files.iter().all(|f| f.exists()));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_input_dir_is_rejected() {
        let req = request(json!({
            "mode": {"folder": {"input_dir": "/definitely/not/a/folder"}}
        }));
        let mut compositor = compositor(&req.config);
        let err = execute(&mut compositor, req, today()).await.unwrap_err();
        assert!(matches!(err, GridsheetError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn cancelled_job_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("in/a.png"));

        let cancel = CancelToken::new();
        cancel.cancel();
        let req = request(json!({
            "output": dir.path().join("x.pdf"),
            "mode": {"folder": {"input_dir": dir.path().join("in")}}
        }));
        let mut compositor = compositor(&req.config).with_cancel_token(cancel);
        let outcome = execute(&mut compositor, req, today()).await.unwrap();
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn folder_job_times_every_phase() {
        use std::sync::{Arc, Mutex};

        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("in/a.png"));

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let req = request(json!({
            "benchmark": true,
            "output": dir.path().join("timed.pdf"),
            "mode": {"folder": {"input_dir": dir.path().join("in")}}
        }));
        assert!(req.benchmark);
        let mut compositor =
            compositor(&req.config).on_timing(move |t| sink.lock().unwrap().push(t.phase));
        execute(&mut compositor, req, today()).await.unwrap();

        assert_eq!(
            *phases.lock().unwrap(),
            [Phase::Scan, Phase::ComputeDims, Phase::Render, Phase::Save]
        );
    }
}
