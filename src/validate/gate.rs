use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::validate::coverage::silhouette_coverage;
use crate::validate::scorer::{PermissiveScorer, SimilarityScorer};

/// Similarity reported when the scorer fails.
const DEGRADED_SIMILARITY: f32 = 1.0;

/// Quality gate thresholds.
///
/// The silhouette bounds assume the object is brighter than the preview background, which holds
/// for the CPU rasterizer's default black background. Over a bright background, coverage counts
/// the background instead and the bounds need adjusting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Fewest points accepted (inclusive).
    pub min_points: u64,
    /// Most points accepted (inclusive).
    pub max_points: u64,
    /// Lowest prompt/preview similarity accepted.
    pub min_clip_sim: f32,
    /// Lowest fraction of preview pixels above the Otsu threshold.
    pub min_silhouette: f32,
    /// Highest fraction of preview pixels above the Otsu threshold.
    pub max_silhouette: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_points: 100,
            max_points: 1_000_000,
            min_clip_sim: 0.2,
            min_silhouette: 0.05,
            max_silhouette: 0.8,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> SplatgenResult<()> {
        if self.min_points > self.max_points {
            return Err(SplatgenError::validation(
                "validation min_points must be <= max_points",
            ));
        }
        if !(self.min_silhouette <= self.max_silhouette) {
            return Err(SplatgenError::validation(
                "validation min_silhouette must be <= max_silhouette",
            ));
        }
        if self.min_clip_sim.is_nan() {
            return Err(SplatgenError::validation("validation min_clip_sim is NaN"));
        }
        Ok(())
    }
}

/// Why the gate rejected a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Point count outside `[min_points, max_points]`.
    PointCount,
    /// Prompt/preview similarity below `min_clip_sim`.
    Clip,
    /// Silhouette coverage outside `[min_silhouette, max_silhouette]`.
    Silhouette,
}

/// Measurements gathered while evaluating. Stages that did not run leave their metric unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Scorer similarity, or 1.0 when the scorer failed.
    pub clip_similarity: Option<f32>,
    /// Fraction of preview pixels above the Otsu threshold.
    pub silhouette_coverage: Option<f32>,
    /// Point count the gate evaluated.
    pub num_points: u64,
}

/// Final gate decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: bool,
    /// Set exactly when `accepted` is false.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<RejectReason>,
    pub metrics: ValidationMetrics,
}

/// Gate progress. Transitions only move forward; the two terminal states are final.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateState {
    Pending,
    CountChecked,
    SimilarityChecked,
    Accepted,
    Rejected(RejectReason),
}

impl GateState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected(_))
    }
}

/// Three-stage quality gate: point count, prompt similarity, silhouette coverage.
///
/// Stages run in that order and stop at the first failure, so a point-count rejection never
/// invokes the scorer.
#[derive(Clone)]
pub struct QualityGate {
    cfg: GateConfig,
    scorer: Arc<dyn SimilarityScorer>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(GateConfig::default(), Arc::new(PermissiveScorer))
    }
}

impl QualityGate {
    pub fn new(cfg: GateConfig, scorer: Arc<dyn SimilarityScorer>) -> Self {
        Self { cfg, scorer }
    }

    pub fn config(&self) -> &GateConfig {
        &self.cfg
    }

    /// Evaluate one generation result from its point count and a single preview image.
    #[tracing::instrument(skip(self, preview))]
    pub fn evaluate(&self, prompt: &str, num_points: u64, preview: &RgbImage) -> ValidationResult {
        let mut run = GateRun::new(num_points);

        while !run.state.is_terminal() {
            run.state = match run.state {
                GateState::Pending => self.check_count(&run),
                GateState::CountChecked => self.check_similarity(&mut run, prompt, preview),
                GateState::SimilarityChecked => self.check_silhouette(&mut run, preview),
                terminal => terminal,
            };
            tracing::trace!(state = ?run.state, "gate step");
        }

        let reason = match run.state {
            GateState::Rejected(reason) => Some(reason),
            _ => None,
        };
        if let Some(reason) = reason {
            tracing::info!(?reason, metrics = ?run.metrics, "generation rejected");
        }
        ValidationResult {
            accepted: reason.is_none(),
            reason,
            metrics: run.metrics,
        }
    }

    fn check_count(&self, run: &GateRun) -> GateState {
        let n = run.metrics.num_points;
        if n < self.cfg.min_points || n > self.cfg.max_points {
            GateState::Rejected(RejectReason::PointCount)
        } else {
            GateState::CountChecked
        }
    }

    fn check_similarity(&self, run: &mut GateRun, prompt: &str, preview: &RgbImage) -> GateState {
        let sim = match self.scorer.similarity(prompt, preview) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "similarity scorer failed; accepting");
                DEGRADED_SIMILARITY
            }
        };
        run.metrics.clip_similarity = Some(sim);
        if sim < self.cfg.min_clip_sim {
            GateState::Rejected(RejectReason::Clip)
        } else {
            GateState::SimilarityChecked
        }
    }

    fn check_silhouette(&self, run: &mut GateRun, preview: &RgbImage) -> GateState {
        let cov = silhouette_coverage(preview);
        run.metrics.silhouette_coverage = Some(cov);
        if cov < self.cfg.min_silhouette || cov > self.cfg.max_silhouette {
            GateState::Rejected(RejectReason::Silhouette)
        } else {
            GateState::Accepted
        }
    }
}

struct GateRun {
    state: GateState,
    metrics: ValidationMetrics,
}

impl GateRun {
    fn new(num_points: u64) -> Self {
        Self {
            state: GateState::Pending,
            metrics: ValidationMetrics {
                num_points,
                ..ValidationMetrics::default()
            },
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/validate/gate.rs"]
mod tests;
