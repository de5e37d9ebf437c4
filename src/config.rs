use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::camera::orbit::OrbitConfig;
use crate::encode::ffmpeg::EncoderOpts;
use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::generate::backend::BackendConfig;
use crate::generate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::render::cpu::{CpuRasterizer, CpuRasterizerOpts};
use crate::validate::gate::{GateConfig, QualityGate};
use crate::validate::scorer::{
    CommandScorer, CommandScorerConfig, PermissiveScorer, SimilarityScorer,
};

/// Service configuration, read from a JSON document. Every section has defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub orbit: OrbitConfig,
    pub validation: GateConfig,
    /// External similarity scorer. Without one every preview scores 1.0.
    pub scorer: Option<CommandScorerConfig>,
    pub rasterizer: CpuRasterizerOpts,
    pub encoder: EncoderOpts,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8093,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model_variant: String,
    /// Default backend timeout in seconds.
    pub timeout_s: f64,
    pub max_concurrent: usize,
    pub backend: Option<BackendConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_variant: "sd15".to_owned(),
            timeout_s: 28.0,
            max_concurrent: 1,
            backend: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl LogConfig {
    pub fn max_level(&self) -> SplatgenResult<tracing::Level> {
        self.level
            .parse()
            .map_err(|_| SplatgenError::validation(format!("unknown log level '{}'", self.level)))
    }
}

impl ServiceConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_path(path: &Path) -> SplatgenResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        Self::from_reader(BufReader::new(f))
    }

    /// Read and validate a JSON configuration document.
    pub fn from_reader(r: impl Read) -> SplatgenResult<Self> {
        let cfg: Self = serde_json::from_reader(r)
            .map_err(|e| SplatgenError::validation(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SplatgenResult<()> {
        let g = &self.generation;
        if !(g.timeout_s.is_finite() && g.timeout_s > 0.0) {
            return Err(SplatgenError::validation(
                "generation timeout_s must be positive",
            ));
        }
        if Duration::try_from_secs_f64(g.timeout_s).is_err() {
            return Err(SplatgenError::validation(format!(
                "generation timeout_s {} is out of range",
                g.timeout_s
            )));
        }
        if g.max_concurrent == 0 {
            return Err(SplatgenError::validation(
                "generation max_concurrent must be >= 1",
            ));
        }
        if let Some(backend) = &g.backend {
            backend.validate()?;
        }
        self.orbit.validate()?;
        if !self.orbit.width.is_multiple_of(2) || !self.orbit.height.is_multiple_of(2) {
            return Err(SplatgenError::validation(
                "orbit width/height must be even (required for yuv420p video)",
            ));
        }
        self.validation.validate()?;
        self.encoder.validate()?;
        if self.rasterizer.threads == Some(0) {
            return Err(SplatgenError::validation(
                "rasterizer 'threads' must be >= 1 when set",
            ));
        }
        self.log.max_level()?;
        Ok(())
    }

    /// Orchestrator settings derived from this configuration.
    pub fn orchestrator_settings(&self) -> SplatgenResult<OrchestratorSettings> {
        let timeout = Duration::try_from_secs_f64(self.generation.timeout_s).map_err(|e| {
            SplatgenError::validation(format!("generation timeout_s: {e}"))
        })?;
        Ok(OrchestratorSettings {
            orbit: self.orbit.clone(),
            encoder: self.encoder.clone(),
            timeout,
            max_concurrent: self.generation.max_concurrent,
            model_variant: self.generation.model_variant.clone(),
        })
    }

    /// Similarity scorer chosen at startup.
    pub fn scorer(&self) -> Arc<dyn SimilarityScorer> {
        match &self.scorer {
            Some(cfg) => Arc::new(CommandScorer::new(cfg.clone())),
            None => Arc::new(PermissiveScorer),
        }
    }

    /// Build the orchestrator with the configured backend, CPU rasterizer and gate.
    pub fn build_orchestrator(&self) -> SplatgenResult<Orchestrator> {
        let backend = self
            .generation
            .backend
            .as_ref()
            .ok_or_else(|| SplatgenError::validation("generation.backend must be configured"))?
            .build();
        let rasterizer = Arc::new(CpuRasterizer::new(self.rasterizer.clone())?);
        let gate = QualityGate::new(self.validation.clone(), self.scorer());
        Ok(Orchestrator::new(
            backend,
            rasterizer,
            gate,
            self.orchestrator_settings()?,
        ))
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/service.rs"]
mod tests;
