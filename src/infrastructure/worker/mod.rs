//! Worker Layer - Background Task Processing
//!
//! 实现 GenerationRunner，在后台执行已准备好的生成

mod generation_runner;

pub use generation_runner::{GenerationRunner, GenerationRunnerConfig};
