use crate::core::errors::{RegistryError, Result};
use crate::model::{ChangeOp, NewReservation, Reservation};
use crate::store::{QueryFilter, ReservationStore};
use crate::sync::{ChangeFeed, ChangePublisher};
use async_trait::async_trait;
use chrono::Utc;
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const RESERVATIONS_TREE: &str = "reservations";
const NUMBERS_TREE: &str = "numbers";

/// Persistent store on sled.
///
/// Two trees: `reservations` maps record id to the bincode-encoded record,
/// `numbers` maps the big-endian slot number to the owning record id. A
/// slot is claimed with compare-and-swap on the `numbers` tree, which is
/// the atomic uniqueness check. Record mutations run CAS loops on the
/// stored bytes so ownership checks hold against concurrent writers.
pub struct SledStore {
    _db: Db,
    reservations: Tree,
    numbers: Tree,
    publisher: ChangePublisher,
}

impl SledStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>, event_capacity: usize) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, event_capacity)
    }

    /// Ephemeral store for short-lived sessions and tests.
    pub fn temporary(event_capacity: usize) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, event_capacity)
    }

    fn from_db(db: Db, event_capacity: usize) -> Result<Self> {
        let reservations = db.open_tree(RESERVATIONS_TREE)?;
        let numbers = db.open_tree(NUMBERS_TREE)?;
        let store = Self {
            _db: db,
            reservations,
            numbers,
            publisher: ChangePublisher::new(event_capacity),
        };
        store.heal_index()?;
        Ok(store)
    }

    /// Reconcile the number index with the record tree.
    ///
    /// A crash can land between the slot claim and the record write (or
    /// between the record removal and the slot release); either way the
    /// trees disagree at reopen and the index is brought back in line here.
    fn heal_index(&self) -> Result<()> {
        for item in self.numbers.iter() {
            let (number_key, id_bytes) = item?;
            if self.reservations.get(&id_bytes)?.is_none() {
                debug!("releasing stranded slot claim");
                let _ = self
                    .numbers
                    .compare_and_swap(&number_key, Some(&id_bytes), None::<&[u8]>)?;
            }
        }
        for item in self.reservations.iter() {
            let (id_bytes, value) = item?;
            let record = Self::decode(&value)?;
            let _ = self.numbers.compare_and_swap(
                record.number.to_be_bytes(),
                None::<&[u8]>,
                Some(&id_bytes[..]),
            )?;
        }
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Reservation> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn encode(record: &Reservation) -> Result<Vec<u8>> {
        Ok(bincode::serialize(record)?)
    }
}

#[async_trait]
impl ReservationStore for SledStore {
    async fn query(&self, filter: &QueryFilter) -> Result<Vec<Reservation>> {
        let mut rows = Vec::new();
        for item in self.reservations.iter() {
            let (_, value) = item?;
            let record = Self::decode(&value)?;
            if filter.matches(&record) {
                rows.push(record);
            }
        }
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
        let encoded = Self::encode(&record)?;
        let number_key = record.number.to_be_bytes();
        let id_bytes = record.id.as_bytes().as_slice();

        // Claim the slot: insert-if-absent on the number index.
        let claim = self
            .numbers
            .compare_and_swap(number_key, None::<&[u8]>, Some(id_bytes))?;
        if claim.is_err() {
            return Err(RegistryError::conflict(record.number));
        }

        if let Err(err) = self.reservations.insert(record.id.as_bytes(), encoded) {
            // Release the claim so the slot is not stranded.
            let _ = self
                .numbers
                .compare_and_swap(number_key, Some(id_bytes), None::<&[u8]>);
            return Err(err.into());
        }

        self.publisher.publish(ChangeOp::Insert);
        debug!(number = record.number, id = %record.id, "record inserted");
        Ok(record)
    }

    async fn update(&self, id: Uuid, owner: &str, subject: &str) -> Result<Reservation> {
        let key = id.as_bytes();
        loop {
            let existing = self
                .reservations
                .get(key)?
                .ok_or_else(|| RegistryError::not_found(id))?;
            let mut record = Self::decode(&existing)?;
            if !record.is_owned_by(owner) {
                return Err(RegistryError::forbidden(id));
            }
            record.subject = subject.to_string();
            let encoded = Self::encode(&record)?;

            match self
                .reservations
                .compare_and_swap(key, Some(&existing), Some(encoded))?
            {
                Ok(()) => {
                    self.publisher.publish(ChangeOp::Update);
                    return Ok(record);
                }
                // Lost a race with another writer; re-read and re-check.
                Err(_) => continue,
            }
        }
    }

    async fn delete(&self, id: Uuid, owner: &str) -> Result<()> {
        let key = id.as_bytes();
        loop {
            let existing = self
                .reservations
                .get(key)?
                .ok_or_else(|| RegistryError::not_found(id))?;
            let record = Self::decode(&existing)?;
            if !record.is_owned_by(owner) {
                return Err(RegistryError::forbidden(id));
            }

            match self
                .reservations
                .compare_and_swap(key, Some(&existing), None::<&[u8]>)?
            {
                Ok(()) => {
                    // Free the slot only if it still points at this record.
                    let _ = self.numbers.compare_and_swap(
                        record.number.to_be_bytes(),
                        Some(id.as_bytes().as_slice()),
                        None::<&[u8]>,
                    )?;
                    self.publisher.publish(ChangeOp::Delete);
                    debug!(number = record.number, id = %id, "record deleted");
                    return Ok(());
                }
                Err(_) => continue,
            }
        }
    }

    fn subscribe(&self) -> ChangeFeed {
        self.publisher.subscribe()
    }
}
