//! Frame loading, PSNR scoring and result records shared by the evaluator
//! and sweep binaries.

pub mod compare;
pub mod config;
pub mod frame;
pub mod loader;
pub mod metric;
pub mod record;
