use super::*;
use crate::foundation::core::Canvas;
use crate::render::backend::RasterTensor;
use crate::validate::gate::{GateConfig, RejectReason};
use crate::validate::scorer::PermissiveScorer;
use async_trait::async_trait;
use glam::{Mat3, Mat4};
use std::collections::BTreeMap;
use std::io::{Cursor, Read as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_stream::StreamExt as _;

const FIELDS: [&str; 14] = [
    "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

fn ply_with_points(n: usize) -> Vec<u8> {
    let mut raw = format!("ply\nformat binary_little_endian 1.0\nelement vertex {n}\n");
    for f in FIELDS {
        raw.push_str(&format!("property float {f}\n"));
    }
    raw.push_str("end_header\n");
    let mut raw = raw.into_bytes();
    let row: [f32; 14] = [
        0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 2.0, -3.0, -3.0, -3.0, 1.0, 0.0, 0.0, 0.0,
    ];
    for _ in 0..n {
        for v in row {
            raw.extend(v.to_le_bytes());
        }
    }
    raw
}

struct StubBackend {
    scene: Vec<u8>,
    reported: u64,
    preview: Option<RgbImage>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail: bool,
}

impl StubBackend {
    fn new(points: usize, reported: u64) -> Self {
        Self {
            scene: ply_with_points(points),
            reported,
            preview: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate(&self, _prompt: &str, seed: Option<u64>) -> SplatgenResult<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(SplatgenError::backend("model crashed"));
        }
        Ok(GenerationOutput {
            scene_bytes: self.scene.clone(),
            num_points: self.reported,
            seed: seed.map(|s| s + 1),
            preview_image: self.preview.clone(),
            timings: BTreeMap::from([("diffusion".to_owned(), 0.25)]),
        })
    }
}

/// Paints the top 40% of rows white.
struct Banded;

impl Rasterizer for Banded {
    fn device(&self) -> &str {
        "stub"
    }

    fn rasterize(
        &self,
        _scene: &SplatScene,
        _view: &Mat4,
        _intrinsics: &Mat3,
        width: u32,
        height: u32,
    ) -> SplatgenResult<RasterTensor> {
        let canvas = Canvas { width, height };
        let bright_rows = (height as usize * 2) / 5;
        let mut data = vec![0.0f32; canvas.rgb8_len()];
        data[..bright_rows * width as usize * 3].fill(1.0);
        RasterTensor::new(vec![height as usize, width as usize, 3], data)
    }
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        orbit: OrbitConfig {
            width: 20,
            height: 10,
            seconds: 1.0,
            fps: 4.0,
            ..OrbitConfig::default()
        },
        ..OrchestratorSettings::default()
    }
}

fn orchestrator(backend: Arc<StubBackend>, settings: OrchestratorSettings) -> Orchestrator {
    let gate = QualityGate::new(GateConfig::default(), Arc::new(PermissiveScorer));
    Orchestrator::new(backend, Arc::new(Banded), gate, settings)
}

fn read_members(zip: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut f = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            f.read_to_end(&mut data).unwrap();
            (f.name().to_owned(), data)
        })
        .collect()
}

#[tokio::test]
async fn accepted_still_is_packaged() {
    let backend = Arc::new(StubBackend::new(5000, 5000));
    let orch = orchestrator(backend.clone(), settings());
    let req = GenerationRequest {
        seed: Some(41),
        ..GenerationRequest::new("a red chair")
    };
    let Outcome::Delivered(zip) = orch.generate_still(req).await.unwrap() else {
        panic!("expected delivery");
    };
    let members = read_members(&zip);
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["scene.ply", "preview.png", "metadata.json"]);
    assert_eq!(members[0].1, ply_with_points(5000));

    let meta: serde_json::Value = serde_json::from_slice(&members[2].1).unwrap();
    assert_eq!(meta["prompt"], "a red chair");
    assert_eq!(meta["seed"], 42);
    assert_eq!(meta["model_variant"], "sd15");
    assert_eq!(meta["num_points"], 5000);
    assert_eq!(meta["validation"]["accepted"], true);
    assert_eq!(meta["camera"]["width"], 20);
    for key in ["diffusion", "generate", "export", "total"] {
        assert!(meta["timings"][key].is_number(), "{key}");
    }

    let preview = image::load_from_memory(&members[1].1).unwrap().to_rgb8();
    assert_eq!(preview.dimensions(), (20, 10));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn too_few_points_is_rejected() {
    let orch = orchestrator(Arc::new(StubBackend::new(50, 50)), settings());
    let Outcome::Rejected(v) = orch.generate_still(GenerationRequest::new("x")).await.unwrap()
    else {
        panic!("expected rejection");
    };
    assert_eq!(v.reason, Some(RejectReason::PointCount));
    assert_eq!(v.metrics.num_points, 50);
}

#[tokio::test]
async fn unreported_count_uses_decoded_and_mismatch_uses_reported() {
    let orch = orchestrator(Arc::new(StubBackend::new(150, 0)), settings());
    assert!(matches!(
        orch.generate_still(GenerationRequest::new("x")).await.unwrap(),
        Outcome::Delivered(_)
    ));

    let orch = orchestrator(Arc::new(StubBackend::new(150, 20)), settings());
    let Outcome::Rejected(v) = orch.generate_still(GenerationRequest::new("x")).await.unwrap()
    else {
        panic!("expected rejection");
    };
    assert_eq!(v.metrics.num_points, 20);
}

#[test]
fn reconcile_points_rules() {
    assert_eq!(reconcile_points(0, 7), 7);
    assert_eq!(reconcile_points(7, 7), 7);
    assert_eq!(reconcile_points(9, 7), 9);
}

#[tokio::test]
async fn slow_backend_times_out() {
    let backend = StubBackend {
        delay: Duration::from_millis(500),
        ..StubBackend::new(5000, 0)
    };
    let orch = orchestrator(Arc::new(backend), settings());
    let req = GenerationRequest {
        timeout: Some(Duration::from_millis(20)),
        ..GenerationRequest::new("x")
    };
    let err = orch.generate_still(req).await.unwrap_err();
    assert!(matches!(err, SplatgenError::BackendTimeout(_)));
    assert!(err.is_backend_unavailable());
}

#[tokio::test]
async fn backend_and_decode_failures_propagate() {
    let backend = StubBackend {
        fail: true,
        ..StubBackend::new(5000, 0)
    };
    let err = orchestrator(Arc::new(backend), settings())
        .generate_still(GenerationRequest::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SplatgenError::BackendFailure(_)));

    let backend = StubBackend {
        scene: b"not a ply".to_vec(),
        ..StubBackend::new(0, 0)
    };
    let err = orchestrator(Arc::new(backend), settings())
        .generate_still(GenerationRequest::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SplatgenError::MalformedScene(_)));
}

#[tokio::test]
async fn empty_orbit_falls_back_to_backend_preview() {
    let mut s = settings();
    s.orbit.fps = 0.0;

    let orch = orchestrator(Arc::new(StubBackend::new(5000, 0)), s.clone());
    let err = orch
        .generate_still(GenerationRequest::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, SplatgenError::Other(_)));

    let backend = StubBackend {
        preview: Some(RgbImage::from_fn(10, 10, |_, y| {
            if y < 3 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        })),
        ..StubBackend::new(5000, 0)
    };
    let orch = orchestrator(Arc::new(backend), s);
    assert!(matches!(
        orch.generate_still(GenerationRequest::new("x")).await.unwrap(),
        Outcome::Delivered(_)
    ));
}

#[tokio::test]
async fn backend_calls_are_serialized_by_default() {
    let backend = Arc::new(StubBackend {
        delay: Duration::from_millis(30),
        ..StubBackend::new(5000, 0)
    });
    let orch = orchestrator(backend.clone(), settings());
    let (a, b) = tokio::join!(
        orch.generate_still(GenerationRequest::new("a")),
        orch.generate_still(GenerationRequest::new("b"))
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_video_does_not_stream() {
    let orch = orchestrator(Arc::new(StubBackend::new(50, 0)), settings());
    let out = orch
        .generate_video(GenerationRequest::new("x"))
        .await
        .unwrap();
    assert!(matches!(out, Outcome::Rejected(v) if v.reason == Some(RejectReason::PointCount)));
}

#[tokio::test]
async fn accepted_video_streams_mp4() {
    if !crate::encode::ffmpeg::is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let orch = orchestrator(Arc::new(StubBackend::new(5000, 0)), settings());
    let Outcome::Delivered(mut stream) = orch
        .generate_video(GenerationRequest::new("x"))
        .await
        .unwrap()
    else {
        panic!("expected delivery");
    };
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend(chunk.unwrap());
    }
    assert_eq!(&bytes[4..8], b"ftyp");
}
