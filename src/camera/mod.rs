//! Orbit trajectory planning and camera matrices.

/// Orbit configuration and the lazy pose sequence.
pub mod orbit;
/// Look-at view matrices and pinhole intrinsics.
pub mod projection;
