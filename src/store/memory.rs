use crate::core::errors::{RegistryError, Result};
use crate::model::{ChangeOp, NewReservation, Reservation};
use crate::store::{QueryFilter, ReservationStore};
use crate::sync::{ChangeFeed, ChangePublisher};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// In-process store backed by concurrent maps.
///
/// The number index is the uniqueness gate: claiming a slot is a single
/// vacant-entry insert into `by_number`, atomic per shard. No application
/// lock exists anywhere else.
pub struct MemoryStore {
    by_id: DashMap<Uuid, Reservation>,
    by_number: DashMap<u16, Uuid>,
    publisher: ChangePublisher,
}

impl MemoryStore {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            by_id: DashMap::new(),
            by_number: DashMap::new(),
            publisher: ChangePublisher::new(event_capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn query(&self, filter: &QueryFilter) -> Result<Vec<Reservation>> {
        let mut rows: Vec<Reservation> = self
            .by_id
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|record| filter.matches(record))
            .collect();
        rows.sort_by_key(|record| record.number);
        Ok(rows)
    }

    async fn insert(&self, new: NewReservation) -> Result<Reservation> {
        let record = Reservation {
            id: Uuid::new_v4(),
            number: new.number,
            subject: new.subject,
            owner: new.owner,
            created_at: Utc::now(),
        };
        match self.by_number.entry(record.number) {
            Entry::Occupied(_) => Err(RegistryError::conflict(record.number)),
            Entry::Vacant(slot) => {
                slot.insert(record.id);
                self.by_id.insert(record.id, record.clone());
                self.publisher.publish(ChangeOp::Insert);
                debug!(number = record.number, id = %record.id, "record inserted");
                Ok(record)
            }
        }
    }

    async fn update(&self, id: Uuid, owner: &str, subject: &str) -> Result<Reservation> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| RegistryError::not_found(id))?;
        if !entry.is_owned_by(owner) {
            return Err(RegistryError::forbidden(id));
        }
        entry.subject = subject.to_string();
        let updated = entry.clone();
        drop(entry);
        self.publisher.publish(ChangeOp::Update);
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, owner: &str) -> Result<()> {
        // Check and removal under the same entry lock.
        match self.by_id.remove_if(&id, |_, record| record.is_owned_by(owner)) {
            Some((_, record)) => {
                self.by_number.remove(&record.number);
                self.publisher.publish(ChangeOp::Delete);
                debug!(number = record.number, id = %id, "record deleted");
                Ok(())
            }
            None if self.by_id.contains_key(&id) => Err(RegistryError::forbidden(id)),
            None => Err(RegistryError::not_found(id)),
        }
    }

    fn subscribe(&self) -> ChangeFeed {
        self.publisher.subscribe()
    }
}
