//! Video transcode queue (spec §4.4, §5 "Media queue"): a single-worker
//! FIFO queue that probes, transcodes, and posters uploaded videos, with
//! cooperative cancellation of both queued and in-flight jobs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

use canvas_store::Store;

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use crate::thumbnail::poster_path;

/// Output codec targets. WebM/VP9 is the default per spec §4.4; MP4/H.264
/// exists but is disabled unless [`MediaConfig::enable_mp4_output`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeFormat {
    Webm,
    Mp4,
}

impl TranscodeFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TranscodeFormat::Webm => "webm",
            TranscodeFormat::Mp4 => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeFormat::Webm => "webm",
            TranscodeFormat::Mp4 => "mp4",
        }
    }
}

/// Probed source media properties (`ffprobe` output, spec §4.4).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: Option<String>,
    pub fps: f64,
}

/// A job enqueued for transcoding.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub filename: String,
    pub source_path: PathBuf,
    pub formats: Vec<TranscodeFormat>,
    pub delete_original: bool,
}

/// Result of a completed job, as emitted in `video_processing_complete`.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whether an already-present video needs transcoding at all, per §4.4
/// ("original is WebM/VP9 within max dims, or MP4/H.264 within max dims =
/// skip").
pub fn needs_transcode(probe: &ProbeInfo, max_width: u32, max_height: u32) -> bool {
    let within_bounds = probe.width <= max_width && probe.height <= max_height;
    let acceptable_codec = matches!(probe.video_codec.as_str(), "vp9" | "h264");
    !(within_bounds && acceptable_codec)
}

/// Scale `(w, h)` down to fit within `(max_w, max_h)`, rounding to even
/// pixels (required by most video codecs), never upscaling.
pub fn target_dimensions(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = f64::min(
        1.0,
        f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64),
    );
    let tw = ((w as f64 * scale) as u32).max(2);
    let th = ((h as f64 * scale) as u32).max(2);
    (tw - (tw % 2), th - (th % 2))
}

/// Observer invoked as a job progresses. Implemented by `canvas-collab` so
/// the queue can emit room-scoped wire events without depending on it.
#[async_trait::async_trait]
pub trait TranscodeObserver: Send + Sync {
    async fn on_queued(&self, filename: &str, position: usize);
    async fn on_start(&self, filename: &str);
    async fn on_progress(&self, filename: &str, format: &str, percent: f64);
    async fn on_complete(&self, result: TranscodeResult);
}

struct QueuedEntry {
    job: TranscodeJob,
    cancel: Arc<AtomicBool>,
    done: oneshot::Sender<TranscodeResult>,
}

struct ActiveJob {
    filename: String,
    cancel: Arc<AtomicBool>,
    child_pid: AtomicU32,
}

/// A single-worker FIFO transcode queue (spec §4.4, §5).
pub struct TranscodeQueue {
    store: Store,
    config: MediaConfig,
    observer: Arc<dyn TranscodeObserver>,
    queue: Mutex<VecDeque<QueuedEntry>>,
    active: Mutex<Option<Arc<ActiveJob>>>,
    notify: tokio::sync::Notify,
    cancel: tokio_util::sync::CancellationToken,
}

impl TranscodeQueue {
    pub fn new(
        store: Store,
        config: MediaConfig,
        observer: Arc<dyn TranscodeObserver>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Arc<Self> {
        let queue = Arc::new(Self {
            store,
            config,
            observer,
            queue: Mutex::new(VecDeque::new()),
            active: Mutex::new(None),
            notify: tokio::sync::Notify::new(),
            cancel,
        });
        let worker = queue.clone();
        tokio::spawn(async move { worker.run().await });
        queue
    }

    /// Enqueue a job; returns a future resolving once the job completes or
    /// is cancelled.
    pub async fn enqueue(&self, job: TranscodeJob) -> oneshot::Receiver<TranscodeResult> {
        let (tx, rx) = oneshot::channel();
        let entry = QueuedEntry {
            job: job.clone(),
            cancel: Arc::new(AtomicBool::new(false)),
            done: tx,
        };
        let mut queue = self.queue.lock().await;
        queue.push_back(entry);
        let position = queue.len();
        drop(queue);
        self.observer.on_queued(&job.filename, position).await;
        self.notify.notify_one();
        rx
    }

    /// Cancel a queued or in-flight job by filename (spec §4.4
    /// "Cancellation"). Queued jobs are removed and their waiter rejected
    /// with a failed result; active jobs are signalled to stop and the
    /// encoder's process tree receives SIGINT, escalating to SIGKILL.
    pub async fn cancel(&self, filename: &str) -> bool {
        {
            let mut queue = self.queue.lock().await;
            if let Some(pos) = queue.iter().position(|e| e.job.filename == filename) {
                let entry = queue.remove(pos).unwrap();
                let _ = entry.done.send(TranscodeResult {
                    filename: filename.to_string(),
                    success: false,
                    formats: Vec::new(),
                    error: Some("cancelled".to_string()),
                });
                for (idx, e) in queue.iter().enumerate() {
                    self.observer.on_queued(&e.job.filename, idx + 1).await;
                }
                return true;
            }
        }
        let active = self.active.lock().await.clone();
        if let Some(active) = active {
            if active.filename == filename {
                active.cancel.store(true, Ordering::SeqCst);
                let pid = active.child_pid.load(Ordering::SeqCst);
                if pid != 0 {
                    signal_process_tree(pid);
                }
                return true;
            }
        }
        false
    }

    async fn run(self: Arc<Self>) {
        loop {
            let entry = {
                let mut queue = self.queue.lock().await;
                queue.pop_front()
            };
            let Some(entry) = entry else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = self.cancel.cancelled() => return,
                }
                continue;
            };
            let active = Arc::new(ActiveJob {
                filename: entry.job.filename.clone(),
                cancel: entry.cancel.clone(),
                child_pid: AtomicU32::new(0),
            });
            *self.active.lock().await = Some(active.clone());
            self.observer.on_start(&entry.job.filename).await;

            let result = self.run_job(&entry.job, &active).await;
            *self.active.lock().await = None;

            if let Err(e) = self
                .store
                .update_processing_status(
                    &entry.job.filename,
                    if result.success {
                        canvas_store::ProcessingStatus::Completed
                    } else {
                        canvas_store::ProcessingStatus::Failed
                    },
                    result.error.as_deref(),
                )
                .await
            {
                warn!(error = %e, "failed to persist transcode status");
            }
            self.observer.on_complete(result.clone()).await;
            let _ = entry.done.send(result);
        }
    }

    async fn run_job(&self, job: &TranscodeJob, active: &Arc<ActiveJob>) -> TranscodeResult {
        let probe = match probe_media(&self.config, &job.source_path).await {
            Ok(p) => p,
            Err(e) => {
                return TranscodeResult {
                    filename: job.filename.clone(),
                    success: false,
                    formats: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        let basename = job
            .source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&job.filename)
            .to_string();

        if let Err(e) = generate_poster(&self.config, &job.source_path, &basename, probe.duration_secs).await {
            warn!(filename = %job.filename, error = %e, "poster thumbnail generation failed");
        }

        let mut succeeded = Vec::new();
        for format in &job.formats {
            if active.cancel.load(Ordering::SeqCst) {
                break;
            }
            match self
                .encode_format(job, &basename, &probe, *format, active)
                .await
            {
                Ok(()) => succeeded.push(format.as_str().to_string()),
                Err(e) => warn!(filename = %job.filename, format = ?format, error = %e, "transcode format failed"),
            }
        }

        if active.cancel.load(Ordering::SeqCst) {
            return TranscodeResult {
                filename: job.filename.clone(),
                success: false,
                formats: succeeded,
                error: Some("cancelled".to_string()),
            };
        }

        if !succeeded.is_empty() {
            if let Ok(formats_json) = serde_json::to_string(&succeeded) {
                let _ = self
                    .store
                    .update_processed_formats(&job.filename, &formats_json)
                    .await;
            }
            if job.delete_original && self.config.delete_original_after_transcode {
                let _ = tokio::fs::remove_file(&job.source_path).await;
            }
        }

        TranscodeResult {
            filename: job.filename.clone(),
            success: !succeeded.is_empty(),
            error: if succeeded.is_empty() {
                Some("no output format succeeded".to_string())
            } else {
                None
            },
            formats: succeeded,
        }
    }

    async fn encode_format(
        &self,
        job: &TranscodeJob,
        basename: &str,
        probe: &ProbeInfo,
        format: TranscodeFormat,
        active: &Arc<ActiveJob>,
    ) -> Result<()> {
        let (target_w, target_h) = target_dimensions(probe.width, probe.height, 1920, 1080);
        tokio::fs::create_dir_all(&self.config.transcodes_dir).await?;
        let out_path = self
            .config
            .transcodes_dir
            .join(format!("{basename}.{}", format.extension()));

        let mut cmd = tokio::process::Command::new(&self.config.ffmpeg_bin);
        cmd.arg("-y")
            .arg("-i")
            .arg(&job.source_path)
            .arg("-vf")
            .arg(format!("scale={target_w}:{target_h}"))
            .arg("-progress")
            .arg("pipe:1")
            .arg("-nostats");
        match format {
            TranscodeFormat::Webm => {
                cmd.args(["-c:v", "libvpx-vp9", "-crf", "30", "-b:v", "0"])
                    .args(["-c:a", "libopus", "-b:a", "128k"]);
            }
            TranscodeFormat::Mp4 => {
                cmd.args(["-c:v", "libx264", "-crf", "23"])
                    .args(["-c:a", "aac", "-b:a", "128k"]);
            }
        }
        cmd.arg(&out_path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        set_new_process_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| Error::Subprocess(e.to_string()))?;
        if let Some(pid) = child.id() {
            active.child_pid.store(pid, Ordering::SeqCst);
        }

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let duration = probe.duration_secs.max(0.001);
            let observer = self.observer.clone();
            let filename = job.filename.clone();
            let format_name = format.as_str().to_string();
            let cancel = active.cancel.clone();
            tokio::spawn(async move {
                let mut out_time_secs = 0.0f64;
                while let Ok(Some(line)) = lines.next_line().await {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(value) = line.strip_prefix("out_time_ms=") {
                        if let Ok(micros) = value.trim().parse::<f64>() {
                            out_time_secs = micros / 1_000_000.0;
                            let percent = (out_time_secs / duration * 100.0).clamp(0.0, 100.0);
                            observer.on_progress(&filename, &format_name, percent).await;
                        }
                    }
                }
            });
        }

        let status = child.wait().await.map_err(|e| Error::Subprocess(e.to_string()))?;
        active.child_pid.store(0, Ordering::SeqCst);

        if active.cancel.load(Ordering::SeqCst) {
            let _ = tokio::fs::remove_file(&out_path).await;
            return Err(Error::Subprocess("cancelled".to_string()));
        }
        if !status.success() {
            return Err(Error::Subprocess(format!("ffmpeg exited with {status}")));
        }
        Ok(())
    }
}

/// Probe a source file's media properties via `ffprobe`.
pub async fn probe_media(config: &MediaConfig, path: &Path) -> Result<ProbeInfo> {
    let output = tokio::process::Command::new(&config.ffprobe_bin)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=width,height,codec_name,codec_type,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| Error::Subprocess(e.to_string()))?;

    if !output.status.success() {
        return Err(Error::Subprocess(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }
    parse_probe_json(&output.stdout)
}

fn parse_probe_json(bytes: &[u8]) -> Result<ProbeInfo> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| Error::Subprocess(e.to_string()))?;
    let duration_secs = value["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let mut info = ProbeInfo {
        duration_secs,
        ..Default::default()
    };
    if let Some(streams) = value["streams"].as_array() {
        for stream in streams {
            match stream["codec_type"].as_str() {
                Some("video") => {
                    info.width = stream["width"].as_u64().unwrap_or(0) as u32;
                    info.height = stream["height"].as_u64().unwrap_or(0) as u32;
                    info.video_codec = stream["codec_name"].as_str().unwrap_or("").to_string();
                    if let Some(rate) = stream["r_frame_rate"].as_str() {
                        info.fps = parse_rational(rate);
                    }
                }
                Some("audio") => {
                    info.audio_codec = stream["codec_name"].as_str().map(str::to_string);
                }
                _ => {}
            }
        }
    }
    Ok(info)
}

fn parse_rational(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let (num, den) = (num.parse::<f64>().unwrap_or(0.0), den.parse::<f64>().unwrap_or(1.0));
        if den != 0.0 {
            return num / den;
        }
    }
    s.parse().unwrap_or(0.0)
}

/// A single poster frame at 10% of duration, scaled to width 320 (§4.4).
async fn generate_poster(
    config: &MediaConfig,
    source_path: &Path,
    basename: &str,
    duration_secs: f64,
) -> Result<()> {
    let out = poster_path(config, basename);
    if let Some(parent) = out.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let seek = (duration_secs * 0.10).max(0.0);
    let status = tokio::process::Command::new(&config.ffmpeg_bin)
        .args(["-y", "-ss"])
        .arg(format!("{seek:.3}"))
        .arg("-i")
        .arg(source_path)
        .args(["-frames:v", "1", "-vf", "scale=320:-1"])
        .arg(&out)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::Subprocess(e.to_string()))?;
    if !status.success() {
        return Err(Error::Subprocess(format!(
            "poster generation exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn set_new_process_group(cmd: &mut tokio::process::Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn set_new_process_group(_cmd: &mut tokio::process::Command) {}

#[cfg(unix)]
fn signal_process_tree(pid: u32) {
    unsafe {
        // Negative pid targets the whole process group (the encoder and any
        // children it spawned), since the child was started in its own group.
        if libc::kill(-(pid as i32), libc::SIGINT) != 0 {
            warn!(pid, "SIGINT delivery failed, escalating to SIGKILL");
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    info!(pid, "sent cancellation signal to transcode process group");
}

#[cfg(not(unix))]
fn signal_process_tree(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_transcode_skips_compatible_webm() {
        let probe = ProbeInfo {
            width: 1280,
            height: 720,
            video_codec: "vp9".into(),
            ..Default::default()
        };
        assert!(!needs_transcode(&probe, 1920, 1080));
    }

    #[test]
    fn needs_transcode_flags_oversized_or_incompatible() {
        let oversized = ProbeInfo {
            width: 3840,
            height: 2160,
            video_codec: "vp9".into(),
            ..Default::default()
        };
        assert!(needs_transcode(&oversized, 1920, 1080));

        let wrong_codec = ProbeInfo {
            width: 640,
            height: 480,
            video_codec: "hevc".into(),
            ..Default::default()
        };
        assert!(needs_transcode(&wrong_codec, 1920, 1080));
    }

    #[test]
    fn target_dimensions_scale_down_and_round_even() {
        let (w, h) = target_dimensions(4000, 3000, 1920, 1080);
        assert!(w <= 1920 && h <= 1080);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn target_dimensions_never_upscale() {
        let (w, h) = target_dimensions(640, 480, 1920, 1080);
        assert_eq!((w, h), (640, 480));
    }

    #[test]
    fn parses_ffprobe_json() {
        let json = br#"{"streams":[{"codec_type":"video","width":1920,"height":1080,"codec_name":"h264","r_frame_rate":"30/1"},{"codec_type":"audio","codec_name":"aac"}],"format":{"duration":"12.5"}}"#;
        let probe = parse_probe_json(json).unwrap();
        assert_eq!(probe.width, 1920);
        assert_eq!(probe.height, 1080);
        assert_eq!(probe.video_codec, "h264");
        assert_eq!(probe.audio_codec.as_deref(), Some("aac"));
        assert_eq!(probe.fps, 30.0);
        assert!((probe.duration_secs - 12.5).abs() < 1e-9);
    }
}
