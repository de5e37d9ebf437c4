use super::*;
use std::sync::Mutex;

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Closed;

impl Write for Closed {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn cfg(width: u32, height: u32) -> SinkConfig {
    SinkConfig {
        width,
        height,
        fps: 12.0,
    }
}

fn gradient(i: u64) -> RgbImage {
    RgbImage::from_fn(32, 32, |x, y| image::Rgb([(x * 8) as u8, (y * 8) as u8, (i * 20) as u8]))
}

#[test]
fn begin_rejects_odd_or_zero_sizes() {
    for (w, h) in [(0, 32), (31, 32), (32, 15)] {
        let mut sink = FfmpegStreamSink::new(EncoderOpts::default(), Box::new(Shared::default()));
        assert!(matches!(
            sink.begin(cfg(w, h)),
            Err(SplatgenError::Validation(_))
        ));
    }
    let mut sink = FfmpegStreamSink::new(EncoderOpts::default(), Box::new(Shared::default()));
    assert!(sink.begin(SinkConfig { fps: 0.0, ..cfg(32, 32) }).is_err());
}

#[test]
fn push_before_begin_fails() {
    let mut sink = FfmpegStreamSink::new(EncoderOpts::default(), Box::new(Shared::default()));
    assert!(sink.push_frame(FrameIndex(0), &gradient(0)).is_err());
    assert!(sink.end().is_err());
}

#[test]
fn missing_binary_is_encoding_error() {
    let opts = EncoderOpts {
        ffmpeg: PathBuf::from("/nonexistent/ffmpeg-bin"),
        ..EncoderOpts::default()
    };
    assert!(!is_ffmpeg_available(&opts.ffmpeg));
    let mut sink = FfmpegStreamSink::new(opts, Box::new(Shared::default()));
    assert!(matches!(
        sink.begin(cfg(32, 32)),
        Err(SplatgenError::Encoding(_))
    ));
}

#[test]
fn opts_validation() {
    assert!(EncoderOpts::default().validate().is_ok());
    let bad = EncoderOpts {
        channel_capacity: 0,
        ..EncoderOpts::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn streams_fragmented_mp4() {
    if !is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let out = Shared::default();
    let mut sink = FfmpegStreamSink::new(EncoderOpts::default(), Box::new(out.clone()));
    sink.begin(cfg(32, 32)).unwrap();
    for i in 0..6 {
        sink.push_frame(FrameIndex(i), &gradient(i)).unwrap();
    }
    assert!(sink.push_frame(FrameIndex(3), &gradient(3)).is_err());
    sink.end().unwrap();

    let bytes = out.0.lock().unwrap().clone();
    assert!(bytes.len() > 8);
    assert_eq!(&bytes[4..8], b"ftyp");
    assert!(bytes.windows(4).any(|w| w == b"moof"));
}

#[test]
fn closed_consumer_fails_next_push() {
    if !is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }
    let mut sink = FfmpegStreamSink::new(EncoderOpts::default(), Box::new(Closed));
    sink.begin(cfg(32, 32)).unwrap();
    let mut failed = false;
    for i in 0..2000 {
        if sink.push_frame(FrameIndex(i), &gradient(i)).is_err() {
            failed = true;
            break;
        }
        if i % 50 == 49 {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }
    if !failed {
        assert!(matches!(sink.end(), Err(SplatgenError::Encoding(_))));
    }
}
