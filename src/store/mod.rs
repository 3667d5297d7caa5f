pub mod memory;
pub mod sled_store;

use crate::core::errors::Result;
use crate::model::{AttachmentRef, NewReservation, Reservation};
use crate::sync::ChangeFeed;
use async_trait::async_trait;
use uuid::Uuid;

/// Row filter for `query`. The default selects everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub number: Option<u16>,
    pub owner: Option<String>,
}

impl QueryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_number(number: u16) -> Self {
        Self {
            number: Some(number),
            ..Self::default()
        }
    }

    pub fn by_owner<S: Into<String>>(owner: S) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &Reservation) -> bool {
        if let Some(number) = self.number {
            if record.number != number {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &record.owner != owner {
                return false;
            }
        }
        true
    }
}

/// Authoritative reservation store.
///
/// Implementations must enforce slot uniqueness with an atomic
/// insert-if-absent; callers never lock around `insert`. Ownership
/// preconditions on `update` and `delete` are checked inside the store so
/// they hold against concurrent writers.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Fetch all records matching `filter`, ordered by number ascending.
    async fn query(&self, filter: &QueryFilter) -> Result<Vec<Reservation>>;

    /// Insert a new record. Fails with `Conflict` when the number is
    /// already active.
    async fn insert(&self, new: NewReservation) -> Result<Reservation>;

    /// Replace the subject of an existing record. Fails with `Forbidden`
    /// on owner mismatch and `NotFound` on unknown id.
    async fn update(&self, id: Uuid, owner: &str, subject: &str) -> Result<Reservation>;

    /// Delete a record, freeing its number. Same preconditions as `update`.
    async fn delete(&self, id: Uuid, owner: &str) -> Result<()>;

    /// Open a subscription to this store's change channel.
    fn subscribe(&self) -> ChangeFeed;
}

/// External document-storage collaborator.
///
/// The registry holds foreign references only; creating, serving and
/// storing the blobs is the collaborator's business.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Document references linked to a reservation.
    async fn list_for(&self, reservation: Uuid) -> Result<Vec<AttachmentRef>>;

    /// Remove every document linked to a reservation.
    async fn delete_for(&self, reservation: Uuid) -> Result<()>;
}
