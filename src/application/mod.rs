//! Application layer containing the lifecycle orchestration.
//!
//! This module defines the `LifecycleEngine`, the primary entry point for
//! commitment lifecycle operations. It validates requests up front and drives
//! the storage port, which performs each transition as one atomic operation.

pub mod engine;
