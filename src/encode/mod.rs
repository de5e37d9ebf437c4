pub mod ffmpeg;
pub mod sink;
pub mod stream;

pub use stream::{EncodeStats, encode};
