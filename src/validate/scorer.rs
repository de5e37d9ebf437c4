use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::Context as _;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Text/image similarity capability used by the quality gate.
///
/// Scores are cosine similarities in `[-1, 1]`. Failures are reported to the caller, which decides
/// how to degrade.
pub trait SimilarityScorer: Send + Sync {
    /// Score how well `image` matches `prompt`.
    fn similarity(&self, prompt: &str, image: &RgbImage) -> anyhow::Result<f32>;
}

/// Scorer used when no similarity model is configured. Always returns 1.0.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveScorer;

impl SimilarityScorer for PermissiveScorer {
    fn similarity(&self, _prompt: &str, _image: &RgbImage) -> anyhow::Result<f32> {
        Ok(1.0)
    }
}

/// External scorer program settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandScorerConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments placed before `--prompt P --image PATH`.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Scorer backed by an external program.
///
/// The preview is written to a temporary PNG and the program is invoked as
/// `program [args..] --prompt P --image PATH`; the first token of stdout is parsed as the score.
#[derive(Clone, Debug)]
pub struct CommandScorer {
    cfg: CommandScorerConfig,
}

impl CommandScorer {
    pub fn new(cfg: CommandScorerConfig) -> Self {
        Self { cfg }
    }
}

impl SimilarityScorer for CommandScorer {
    fn similarity(&self, prompt: &str, image: &RgbImage) -> anyhow::Result<f32> {
        let dir = tempfile::tempdir().context("create scorer scratch dir")?;
        let path = dir.path().join("preview.png");
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write scorer input '{}'", path.display()))?;

        let out = Command::new(&self.cfg.program)
            .args(&self.cfg.args)
            .arg("--prompt")
            .arg(prompt)
            .arg("--image")
            .arg(&path)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("spawn scorer '{}'", self.cfg.program.display()))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("scorer exited with {}: {}", out.status, stderr.trim());
        }
        parse_score(&String::from_utf8_lossy(&out.stdout))
    }
}

fn parse_score(stdout: &str) -> anyhow::Result<f32> {
    let tok = stdout
        .split_whitespace()
        .next()
        .context("scorer printed nothing")?;
    let v: f32 = tok
        .parse()
        .with_context(|| format!("scorer output '{tok}' is not a number"))?;
    anyhow::ensure!(v.is_finite(), "scorer output '{tok}' is not finite");
    Ok(v)
}

#[cfg(test)]
#[path = "../../tests/unit/validate/scorer.rs"]
mod tests;
