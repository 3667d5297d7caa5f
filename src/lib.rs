// Core infrastructure modules
pub mod core {
    pub mod config;
    pub mod errors;
}

pub mod coordinator;
pub mod model;
pub mod retry;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use crate::core::config::RegistryConfig;
pub use crate::core::errors::{RegistryError, Result};
pub use crate::coordinator::ReservationCoordinator;
pub use crate::model::{AttachmentRef, ChangeEvent, ChangeOp, NewReservation, Reservation};
pub use crate::retry::RetryPolicy;
pub use crate::store::memory::MemoryStore;
pub use crate::store::sled_store::SledStore;
pub use crate::store::{AttachmentStore, QueryFilter, ReservationStore};
pub use crate::sync::{ChangeFeed, Synchronizer};
