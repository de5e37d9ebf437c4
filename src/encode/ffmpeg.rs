use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{SplatgenError, SplatgenResult};

/// Encoder process settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOpts {
    /// `ffmpeg` executable.
    pub ffmpeg: PathBuf,
    /// Video codec passed to `-c:v`.
    pub codec: String,
    /// Target bitrate passed to `-b:v`.
    pub bitrate: String,
    /// Bounded capacity (in chunks) of the channel carrying encoded bytes to a response.
    pub channel_capacity: usize,
}

impl Default for EncoderOpts {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            codec: "libx264".to_owned(),
            bitrate: "2M".to_owned(),
            channel_capacity: 8,
        }
    }
}

impl EncoderOpts {
    pub fn validate(&self) -> SplatgenResult<()> {
        if self.codec.trim().is_empty() || self.bitrate.trim().is_empty() {
            return Err(SplatgenError::validation(
                "encoder codec and bitrate must be non-empty",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SplatgenError::validation(
                "encoder channel_capacity must be >= 1",
            ));
        }
        Ok(())
    }
}

type Drain<T> = JoinHandle<std::io::Result<T>>;

/// Sink that pipes rgb24 frames into `ffmpeg` and streams the fragmented MP4 it produces.
///
/// Encoded bytes are copied to `out` by a pump thread as soon as `ffmpeg` emits them. When `out`
/// fails (the consumer went away) the pump keeps draining ffmpeg's stdout, the sink is marked
/// cancelled and the next `push_frame` fails with [`SplatgenError::Encoding`]. Dropping the sink
/// before `end` kills and reaps the process.
pub struct FfmpegStreamSink {
    opts: EncoderOpts,
    out: Option<Box<dyn Write + Send>>,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_pump: Option<Drain<u64>>,
    stderr_drain: Option<Drain<Vec<u8>>>,
    cancelled: Arc<AtomicBool>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegStreamSink {
    /// Create a sink writing the encoded stream to `out`. `ffmpeg` starts in `begin`.
    pub fn new(opts: EncoderOpts, out: Box<dyn Write + Send>) -> Self {
        Self {
            opts,
            out: Some(out),
            child: None,
            stdin: None,
            stdout_pump: None,
            stderr_drain: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            cfg: None,
            last_idx: None,
        }
    }

    fn command(&self, cfg: &SinkConfig) -> Command {
        let mut cmd = Command::new(&self.opts.ffmpeg);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            &self.opts.codec,
            "-b:v",
            &self.opts.bitrate,
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "frag_keyframe+empty_moov+default_base_moof",
            "-f",
            "mp4",
            "pipe:1",
        ]);
        cmd
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!("ffmpeg process killed");
        }
    }
}

impl FrameSink for FfmpegStreamSink {
    fn begin(&mut self, cfg: SinkConfig) -> SplatgenResult<()> {
        if !(cfg.fps.is_finite() && cfg.fps > 0.0) {
            return Err(SplatgenError::validation("fps must be positive"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(SplatgenError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(SplatgenError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        let mut out = self
            .out
            .take()
            .ok_or_else(|| SplatgenError::encoding("ffmpeg sink was already started"))?;

        let mut child = self.command(&cfg).spawn().map_err(|e| {
            SplatgenError::encoding(format!(
                "failed to spawn '{}' (is it installed and on PATH?): {e}",
                self.opts.ffmpeg.display()
            ))
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(mut stdout), Some(mut stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SplatgenError::encoding("failed to open ffmpeg pipes"));
        };

        let cancelled = Arc::clone(&self.cancelled);
        let stdout_pump = std::thread::spawn(move || {
            let mut buf = vec![0u8; 64 * 1024];
            let mut written = 0u64;
            loop {
                let n = stdout.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                if cancelled.load(Ordering::Acquire) {
                    continue;
                }
                match out.write_all(&buf[..n]) {
                    Ok(()) => written += n as u64,
                    Err(e) => {
                        tracing::info!(error = %e, "video consumer went away");
                        cancelled.store(true, Ordering::Release);
                    }
                }
            }
            out.flush()?;
            Ok(written)
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(width = cfg.width, height = cfg.height, fps = cfg.fps, "ffmpeg started");
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout_pump = Some(stdout_pump);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &RgbImage) -> SplatgenResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SplatgenError::encoding("ffmpeg sink not started"))?;
        if self.cancelled.load(Ordering::Acquire) {
            return Err(SplatgenError::encoding("video consumer disconnected"));
        }
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(SplatgenError::encoding(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.dimensions() != (cfg.width, cfg.height) {
            return Err(SplatgenError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                cfg.width,
                cfg.height
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SplatgenError::encoding("ffmpeg sink is already finalized"));
        };
        stdin.write_all(frame.as_raw()).map_err(|e| {
            SplatgenError::encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })
    }

    fn end(&mut self) -> SplatgenResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| SplatgenError::encoding("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            SplatgenError::encoding(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let written = join_drain(self.stdout_pump.take(), "stdout")?.unwrap_or(0);
        let stderr_bytes = join_drain(self.stderr_drain.take(), "stderr")?.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(SplatgenError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        if self.cancelled.load(Ordering::Acquire) {
            return Err(SplatgenError::encoding("video consumer disconnected"));
        }

        tracing::debug!(bytes = written, "ffmpeg finished");
        self.cfg = None;
        Ok(())
    }
}

impl Drop for FfmpegStreamSink {
    fn drop(&mut self) {
        self.kill();
    }
}

fn join_drain<T>(handle: Option<Drain<T>>, what: &str) -> SplatgenResult<Option<T>> {
    let Some(handle) = handle else {
        return Ok(None);
    };
    let value = handle
        .join()
        .map_err(|_| SplatgenError::encoding(format!("ffmpeg {what} thread panicked")))?
        .map_err(|e| SplatgenError::encoding(format!("ffmpeg {what} pipe failed: {e}")))?;
    Ok(Some(value))
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SplatgenResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `program -version` runs successfully.
pub fn is_ffmpeg_available(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    is_ffmpeg_available(Path::new("ffmpeg"))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
