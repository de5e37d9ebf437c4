use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SplatgenError, SplatgenResult};

/// What a generation backend hands back for one prompt.
#[derive(Clone, Debug, Default)]
pub struct GenerationOutput {
    /// Scene bytes (PLY).
    pub scene_bytes: Vec<u8>,
    /// Point count reported by the backend; 0 when unreported.
    pub num_points: u64,
    /// Seed actually used, when the backend reports one.
    pub seed: Option<u64>,
    /// Backend-rendered preview, if any.
    pub preview_image: Option<RgbImage>,
    /// Backend step durations in seconds.
    pub timings: BTreeMap<String, f64>,
}

/// Text-to-splat generation capability.
///
/// Constructed once at startup and shared by every request.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, seed: Option<u64>) -> SplatgenResult<GenerationOutput>;
}

/// Backend selection as it appears in configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Command(CommandBackendConfig),
    File(FileBackendConfig),
}

impl BackendConfig {
    pub fn validate(&self) -> SplatgenResult<()> {
        match self {
            Self::Command(c) if c.program.as_os_str().is_empty() => Err(
                SplatgenError::validation("generation backend program must be set"),
            ),
            Self::File(f) if f.scene.as_os_str().is_empty() => Err(SplatgenError::validation(
                "generation backend scene path must be set",
            )),
            _ => Ok(()),
        }
    }

    /// Construct the configured backend.
    pub fn build(&self) -> Arc<dyn GenerationBackend> {
        match self {
            Self::Command(c) => Arc::new(CommandBackend::new(c.clone())),
            Self::File(f) => Arc::new(FileBackend::new(f.clone())),
        }
    }
}

/// External generator program settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandBackendConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before `--prompt P --out DIR [--seed S]`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Optional sidecar written by a command backend next to its outputs.
#[derive(Debug, Default, Deserialize)]
struct ResultSidecar {
    #[serde(default)]
    num_points: Option<u64>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    timings: BTreeMap<String, f64>,
}

const SIDECAR: &str = "result.json";

/// Backend that runs an external generator once per request.
///
/// The program is invoked as `program [args..] --prompt P --out DIR [--seed S]` with a fresh
/// temporary `DIR`. Afterwards the first `*.ply` in `DIR` is the scene, the first `*.png`/`*.jpg`
/// the preview and `result.json` may carry `{num_points, seed, timings}`. The child is killed when
/// the returned future is dropped.
pub struct CommandBackend {
    cfg: CommandBackendConfig,
}

impl CommandBackend {
    pub fn new(cfg: CommandBackendConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl GenerationBackend for CommandBackend {
    async fn generate(&self, prompt: &str, seed: Option<u64>) -> SplatgenResult<GenerationOutput> {
        let dir = tempfile::tempdir().context("create backend output dir")?;

        let mut cmd = tokio::process::Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .arg("--prompt")
            .arg(prompt)
            .arg("--out")
            .arg(dir.path());
        if let Some(seed) = seed {
            cmd.arg("--seed").arg(seed.to_string());
        }
        if let Some(wd) = &self.cfg.working_dir {
            cmd.current_dir(wd);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let out = cmd.output().await.map_err(|e| {
            SplatgenError::backend(format!(
                "failed to spawn '{}': {e}",
                self.cfg.program.display()
            ))
        })?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(SplatgenError::backend(format!(
                "generator exited with {}: {}",
                out.status,
                tail(stderr.trim(), 2000)
            )));
        }

        collect_outputs(dir.path()).await
    }
}

async fn collect_outputs(dir: &Path) -> SplatgenResult<GenerationOutput> {
    let mut names = Vec::new();
    let list_err = |e: std::io::Error| SplatgenError::backend(format!("list output dir: {e}"));
    let mut entries = tokio::fs::read_dir(dir).await.map_err(list_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
        names.push(entry.path());
    }
    names.sort();

    let has_ext = |p: &Path, exts: &[&str]| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
    };
    let scene_path = names
        .iter()
        .find(|p| has_ext(p, &["ply"]))
        .ok_or_else(|| SplatgenError::backend("generator produced no .ply file"))?;
    let scene_bytes = tokio::fs::read(scene_path).await.map_err(|e| {
        SplatgenError::backend(format!("read '{}': {e}", scene_path.display()))
    })?;

    let preview_image = match names.iter().find(|p| has_ext(p, &["png", "jpg", "jpeg"])) {
        Some(p) => {
            let raw = tokio::fs::read(p)
                .await
                .map_err(|e| SplatgenError::backend(format!("read '{}': {e}", p.display())))?;
            match image::load_from_memory(&raw) {
                Ok(img) => Some(img.to_rgb8()),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "ignoring undecodable preview");
                    None
                }
            }
        }
        None => None,
    };

    let sidecar = dir.join(SIDECAR);
    let meta = if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
        let raw = tokio::fs::read(&sidecar)
            .await
            .map_err(|e| SplatgenError::backend(format!("read result.json: {e}")))?;
        serde_json::from_slice::<ResultSidecar>(&raw)
            .map_err(|e| SplatgenError::backend(format!("invalid result.json: {e}")))?
    } else {
        ResultSidecar::default()
    };

    Ok(GenerationOutput {
        scene_bytes,
        num_points: meta.num_points.unwrap_or(0),
        seed: meta.seed,
        preview_image,
        timings: meta.timings,
    })
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Fixed scene served from disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileBackendConfig {
    /// PLY file returned for every prompt.
    pub scene: PathBuf,
    /// Optional preview image.
    #[serde(default)]
    pub preview: Option<PathBuf>,
}

/// Backend that ignores the prompt and returns a scene file from disk.
pub struct FileBackend {
    cfg: FileBackendConfig,
}

impl FileBackend {
    pub fn new(cfg: FileBackendConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl GenerationBackend for FileBackend {
    async fn generate(&self, _prompt: &str, seed: Option<u64>) -> SplatgenResult<GenerationOutput> {
        let scene_bytes = tokio::fs::read(&self.cfg.scene).await.map_err(|e| {
            SplatgenError::backend(format!("read '{}': {e}", self.cfg.scene.display()))
        })?;
        let preview_image = match &self.cfg.preview {
            Some(p) => {
                let raw = tokio::fs::read(p)
                    .await
                    .map_err(|e| SplatgenError::backend(format!("read '{}': {e}", p.display())))?;
                let img = image::load_from_memory(&raw)
                    .map_err(|e| SplatgenError::backend(format!("decode '{}': {e}", p.display())))?;
                Some(img.to_rgb8())
            }
            None => None,
        };
        Ok(GenerationOutput {
            scene_bytes,
            num_points: 0,
            seed,
            preview_image,
            timings: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/generate/backend.rs"]
mod tests;
