//! Splat scene decoding.
//!
//! Generation backends hand over PLY documents in the layout used by 3D Gaussian Splatting
//! exporters. [`splat::SplatScene::decode`] turns them into typed arrays ready for rendering.

pub(crate) mod ply;
/// Decoded splat arrays.
pub mod splat;
