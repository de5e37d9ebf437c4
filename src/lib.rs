//! splatgen turns text prompts into Gaussian-splat scenes and delivers them.
//!
//! A generation backend produces PLY scene bytes. The service then:
//!
//! - Decodes the splats into a [`SplatScene`]
//! - Renders a turntable orbit through a [`Rasterizer`]
//! - Gates the result on point count, prompt similarity and silhouette coverage
//! - Packages accepted scenes as a zip archive or streams an MP4 orbit
#![forbid(unsafe_code)]

mod foundation;

/// Orbit planning and view/projection matrices.
pub mod camera;
/// Service configuration.
pub mod config;
/// Frame sinks and the ffmpeg MP4 encoder.
pub mod encode;
/// Generation backends and the request orchestrator.
pub mod generate;
/// Result archive packaging.
pub mod package;
/// Rasterizer contract, layout normalization and frame rendering.
pub mod render;
/// Splat scene decoding.
pub mod scene;
/// HTTP surface.
pub mod server;
/// Quality gate.
pub mod validate;

pub use crate::foundation::core::{Canvas, FrameIndex};
pub use crate::foundation::error::{SplatgenError, SplatgenResult};
pub use crate::foundation::math::{SH_C0, sh_dc_to_channel, sigmoid};

pub use crate::camera::orbit::{CameraPose, OrbitConfig, pose_at, poses};
pub use crate::camera::projection::{forward, intrinsics, look_at};
pub use crate::config::ServiceConfig;
pub use crate::encode::ffmpeg::{EncoderOpts, FfmpegStreamSink, is_ffmpeg_on_path};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::encode::{EncodeStats, encode};
pub use crate::generate::backend::{GenerationBackend, GenerationOutput};
pub use crate::generate::orchestrator::{GenerationRequest, Orchestrator, Outcome};
pub use crate::package::archive::{ArtifactMetadata, GenerationArtifact, pack};
pub use crate::render::backend::{RasterTensor, Rasterizer};
pub use crate::render::cpu::{CpuRasterizer, CpuRasterizerOpts};
pub use crate::render::frames::{Frame, render, render_preview};
pub use crate::render::layout::normalize_layout;
pub use crate::scene::splat::SplatScene;
pub use crate::validate::gate::{
    GateConfig, QualityGate, RejectReason, ValidationMetrics, ValidationResult,
};
pub use crate::validate::scorer::{PermissiveScorer, SimilarityScorer};
