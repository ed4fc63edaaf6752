//! Reference software rasterizer for the S3D triangle engine.
//!
//! The device core queues `TriSetup` register images and calls
//! [`render_triangle`] from its render worker with a [`VramView`] over the
//! shared video memory. Everything here is a pure function of that pair.

pub mod raster;
pub mod tex;
pub mod types;
pub mod vram;

pub use raster::render_triangle;
pub use types::{ChipGen, Cmd3d, Color, TexFormat, TriSetup, CMD3D_NOP, CMD3D_TRIANGLE};
pub use vram::VramView;
