use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A slot number bound to an owner and a subject.
///
/// `number` and `owner` are immutable once the record exists; only
/// `subject` may change. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub number: u16,
    pub subject: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}

/// Insert payload for a new reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReservation {
    pub number: u16,
    pub subject: String,
    pub owner: String,
}

/// Reference to a document held by the external storage collaborator.
///
/// The registry stores and returns the reference only; the blob lifecycle
/// belongs to the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: Uuid,
    pub reservation: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Mutation kinds published on the change channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Envelope for a registry mutation signal.
///
/// Carries no record payload: any event means "something changed, resync".
/// Consumers must not assume exactly-once or ordered delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub sequence: u64,
    pub op: ChangeOp,
}
