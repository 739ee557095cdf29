//! Transport adapters in front of the lifecycle engine.

pub mod http;
