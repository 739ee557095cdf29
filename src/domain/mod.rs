//! Domain layer: the commitment record, its lifecycle state machine, the
//! append-only amendment model, and the storage port the application layer
//! drives.

pub mod amendment;
pub mod identity;
pub mod lock;
pub mod ports;
