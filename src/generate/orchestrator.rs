use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::camera::orbit::OrbitConfig;
use crate::encode::ffmpeg::{EncoderOpts, FfmpegStreamSink, is_ffmpeg_available};
use crate::encode::sink::SinkConfig;
use crate::encode::stream::{ChannelWriter, Chunk, encode};
use crate::foundation::error::{SplatgenError, SplatgenResult};
use crate::generate::backend::{GenerationBackend, GenerationOutput};
use crate::package::archive::{ArtifactMetadata, GenerationArtifact, encode_png};
use crate::render::backend::Rasterizer;
use crate::render::frames::{render, render_preview};
use crate::scene::splat::SplatScene;
use crate::validate::gate::{QualityGate, ValidationResult};

/// Result of a generation request that ran to completion.
///
/// A gate rejection is a normal outcome, not an error.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The scene passed the gate; carries the archive or video stream.
    Delivered(T),
    /// The scene failed the gate.
    Rejected(ValidationResult),
}

/// One text-to-scene request.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    /// Text prompt handed to the backend and the similarity scorer.
    pub prompt: String,
    /// Requested seed; the backend picks one when absent.
    pub seed: Option<u64>,
    /// Overrides the configured backend timeout.
    pub timeout: Option<Duration>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            seed: None,
            timeout: None,
        }
    }
}

/// Orchestrator settings that are not capabilities.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub orbit: OrbitConfig,
    pub encoder: EncoderOpts,
    /// Backend timeout used when a request does not carry one.
    pub timeout: Duration,
    /// Concurrent backend calls allowed.
    pub max_concurrent: usize,
    /// Model variant reported in metadata and health.
    pub model_variant: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            orbit: OrbitConfig::default(),
            encoder: EncoderOpts::default(),
            timeout: Duration::from_secs_f64(28.0),
            max_concurrent: 1,
            model_variant: "sd15".to_owned(),
        }
    }
}

/// Encoded MP4 bytes as they leave the encoder.
pub type VideoStream = ReceiverStream<Chunk>;

/// Drives backend → decode → render → gate → package/encode for one request at a time.
///
/// The backend, rasterizer and gate are built once and shared; backend calls are limited by a
/// semaphore sized by `max_concurrent`. CPU-bound steps run on tokio's blocking pool.
pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    rasterizer: Arc<dyn Rasterizer>,
    gate: QualityGate,
    settings: OrchestratorSettings,
    permits: Semaphore,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        rasterizer: Arc<dyn Rasterizer>,
        gate: QualityGate,
        settings: OrchestratorSettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent.max(1));
        Self {
            backend,
            rasterizer,
            gate,
            settings,
            permits,
        }
    }

    /// Rasterizer device name.
    pub fn device(&self) -> &str {
        self.rasterizer.device()
    }

    pub fn model_variant(&self) -> &str {
        &self.settings.model_variant
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Generate a scene and, when it passes the gate, package it as a zip archive.
    #[tracing::instrument(skip(self), fields(prompt = %req.prompt))]
    pub async fn generate_still(&self, req: GenerationRequest) -> SplatgenResult<Outcome<Vec<u8>>> {
        let started = Instant::now();
        let output = self.call_backend(&req).await?;
        let generate_s = started.elapsed().as_secs_f64();

        let rasterizer = Arc::clone(&self.rasterizer);
        let gate = self.gate.clone();
        let orbit = self.settings.orbit.clone();
        let model_variant = self.settings.model_variant.clone();
        blocking(move || {
            let export_started = Instant::now();
            let seed = output.seed.or(req.seed);
            let mut timings = output.timings.clone();
            let gated = decode_and_gate(&*rasterizer, &gate, &orbit, &req.prompt, output)?;
            if !gated.validation.accepted {
                return Ok(Outcome::Rejected(gated.validation));
            }

            let preview_png = encode_png(&gated.preview)?;
            timings.insert("generate".to_owned(), generate_s);
            timings.insert(
                "export".to_owned(),
                export_started.elapsed().as_secs_f64(),
            );
            timings.insert("total".to_owned(), started.elapsed().as_secs_f64());
            let artifact = GenerationArtifact {
                preview_png,
                metadata: ArtifactMetadata {
                    prompt: req.prompt,
                    seed,
                    model_variant,
                    num_points: gated.num_points,
                    timings,
                    validation: gated.validation,
                    camera: orbit,
                },
                scene_bytes: gated.scene_bytes,
            };
            let zip = artifact.to_zip()?;
            tracing::info!(bytes = zip.len(), "still artifact packaged");
            Ok(Outcome::Delivered(zip))
        })
        .await
    }

    /// Generate a scene and, when it passes the gate, stream an orbit video of it.
    ///
    /// Gating finishes before the stream is returned. Rendering and encoding then run in the
    /// background at the pace the stream is consumed; dropping the stream stops them.
    #[tracing::instrument(skip(self), fields(prompt = %req.prompt))]
    pub async fn generate_video(
        &self,
        req: GenerationRequest,
    ) -> SplatgenResult<Outcome<VideoStream>> {
        let output = self.call_backend(&req).await?;

        let rasterizer = Arc::clone(&self.rasterizer);
        let gate = self.gate.clone();
        let orbit = self.settings.orbit.clone();
        let encoder = self.settings.encoder.clone();
        let gated = {
            let rasterizer = Arc::clone(&rasterizer);
            let orbit = orbit.clone();
            blocking(move || decode_and_gate(&*rasterizer, &gate, &orbit, &req.prompt, output))
                .await?
        };
        if !gated.validation.accepted {
            return Ok(Outcome::Rejected(gated.validation));
        }
        if orbit.frame_count() == 0 {
            return Err(SplatgenError::validation("orbit yields no frames to encode"));
        }
        let program = encoder.ffmpeg.clone();
        if !blocking(move || Ok(is_ffmpeg_available(&program))).await? {
            return Err(SplatgenError::encoding(format!(
                "'{}' is required for video encoding but could not be run",
                encoder.ffmpeg.display()
            )));
        }

        let (tx, rx) = mpsc::channel::<Chunk>(encoder.channel_capacity.max(1));
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || {
            let _enter = span.enter();
            let scene = gated.scene;
            let cfg = SinkConfig {
                width: orbit.width,
                height: orbit.height,
                fps: orbit.fps,
            };
            let mut sink = FfmpegStreamSink::new(encoder, Box::new(ChannelWriter::new(tx.clone())));
            let frames = render(&*rasterizer, &scene, &orbit, false);
            match encode(frames, cfg, &mut sink) {
                Ok(stats) => tracing::info!(frames = stats.frames, "video streamed"),
                Err(err) => {
                    tracing::warn!(error = %err, "video stream aborted");
                    drop(sink);
                    let _ = tx.blocking_send(Err(std::io::Error::other(err.to_string())));
                }
            }
        });
        Ok(Outcome::Delivered(ReceiverStream::new(rx)))
    }

    async fn call_backend(&self, req: &GenerationRequest) -> SplatgenResult<GenerationOutput> {
        let timeout = req.timeout.unwrap_or(self.settings.timeout);
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SplatgenError::backend("backend is shutting down"))?;
        let started = Instant::now();
        let output = tokio::time::timeout(timeout, self.backend.generate(&req.prompt, req.seed))
            .await
            .map_err(|_| {
                tracing::warn!(?timeout, "generation backend timed out");
                SplatgenError::BackendTimeout(timeout)
            })??;
        tracing::info!(
            elapsed_s = started.elapsed().as_secs_f64(),
            bytes = output.scene_bytes.len(),
            reported_points = output.num_points,
            "backend finished"
        );
        Ok(output)
    }
}

/// Decoded scene plus its gate decision, shared by the still and video paths.
struct Gated {
    scene: SplatScene,
    scene_bytes: Vec<u8>,
    num_points: u64,
    preview: RgbImage,
    validation: ValidationResult,
}

fn decode_and_gate(
    rasterizer: &dyn Rasterizer,
    gate: &QualityGate,
    orbit: &OrbitConfig,
    prompt: &str,
    output: GenerationOutput,
) -> SplatgenResult<Gated> {
    let scene = SplatScene::decode(&output.scene_bytes)?;
    let num_points = reconcile_points(output.num_points, scene.len());
    let preview = match render_preview(rasterizer, &scene, orbit)? {
        Some(img) => img,
        None => output.preview_image.ok_or_else(|| {
            SplatgenError::Other(anyhow::anyhow!(
                "orbit produced no frames and the backend supplied no preview"
            ))
        })?,
    };
    let validation = gate.evaluate(prompt, num_points, &preview);
    Ok(Gated {
        scene,
        scene_bytes: output.scene_bytes,
        num_points,
        preview,
        validation,
    })
}

/// Point count used for gating. A reported count of 0 means unreported.
pub fn reconcile_points(reported: u64, decoded: usize) -> u64 {
    let decoded = decoded as u64;
    if reported == 0 {
        return decoded;
    }
    if reported != decoded {
        tracing::warn!(reported, decoded, "backend point count disagrees with decoded scene");
    }
    reported
}

async fn blocking<T, F>(f: F) -> SplatgenResult<T>
where
    F: FnOnce() -> SplatgenResult<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| SplatgenError::Other(anyhow::anyhow!("blocking task failed: {e}")))?
}

#[cfg(test)]
#[path = "../../tests/unit/generate/orchestrator.rs"]
mod tests;
