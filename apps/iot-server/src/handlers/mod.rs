//! Handlers 模块

pub mod stats;
pub mod ws;

pub use stats::*;
pub use ws::*;
