use std::io;

use tokio::sync::mpsc;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::error::SplatgenResult;
use crate::render::frames::Frame;

/// Summary of a finished encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Frames pushed into the sink.
    pub frames: u64,
}

/// Drive `frames` through `sink` in a single pass.
///
/// Frames are pulled one at a time, so at most one rendered frame is alive. A frame or sink error
/// stops the pass immediately; `end` is only called after the last frame.
#[tracing::instrument(skip_all, fields(width = cfg.width, height = cfg.height))]
pub fn encode<I>(frames: I, cfg: SinkConfig, sink: &mut dyn FrameSink) -> SplatgenResult<EncodeStats>
where
    I: IntoIterator<Item = SplatgenResult<Frame>>,
{
    sink.begin(cfg)?;
    let mut stats = EncodeStats::default();
    for frame in frames {
        let frame = frame?;
        sink.push_frame(frame.index, &frame.image)?;
        stats.frames += 1;
    }
    sink.end()?;
    tracing::debug!(frames = stats.frames, "encode finished");
    Ok(stats)
}

/// Chunk type carried to a streaming response body.
pub type Chunk = Result<Vec<u8>, io::Error>;

/// Blocking [`io::Write`] adapter over a bounded tokio channel.
///
/// Must be used from a non-async thread. Writes block while the channel is full and fail with
/// `BrokenPipe` once the receiver is dropped.
pub struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self { tx }
    }
}

impl io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "stream receiver closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/stream.rs"]
mod tests;
