use crate::core::config::RegistryConfig;
use crate::core::errors::{RegistryError, Result};
use crate::model::{AttachmentRef, NewReservation, Reservation};
use crate::store::{AttachmentStore, QueryFilter, ReservationStore};
use crate::sync::ChangeFeed;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Business-rule layer over the reservation store.
///
/// Validates input and composes every store call with the retry policy.
/// Uniqueness is delegated to the store's atomic insert; the pre-check
/// query here only short-circuits the common case and is not a
/// correctness guarantee.
pub struct ReservationCoordinator {
    config: RegistryConfig,
    store: Arc<dyn ReservationStore>,
    attachments: Option<Arc<dyn AttachmentStore>>,
}

impl ReservationCoordinator {
    pub fn new(config: RegistryConfig, store: Arc<dyn ReservationStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            attachments: None,
        })
    }

    /// Attach the external document collaborator.
    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Full snapshot ordered by number ascending.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Reservation>> {
        let filter = QueryFilter::all();
        self.config
            .retry
            .run("query", || self.store.query(&filter))
            .await
    }

    /// Reserve a free slot for `owner`.
    #[instrument(skip(self, subject))]
    pub async fn reserve(&self, number: u16, subject: &str, owner: &str) -> Result<Reservation> {
        if !self.config.contains(number) {
            return Err(RegistryError::validation_field(
                format!(
                    "number {number} is outside {}..={}",
                    self.config.first_number, self.config.last_number
                ),
                "number",
            ));
        }
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(RegistryError::validation_field(
                "subject must not be empty",
                "subject",
            ));
        }

        // Advisory pre-check; the insert below is the authoritative
        // uniqueness gate.
        let filter = QueryFilter::by_number(number);
        let taken = self
            .config
            .retry
            .run("query", || self.store.query(&filter))
            .await?;
        if !taken.is_empty() {
            return Err(RegistryError::conflict(number));
        }

        let new = NewReservation {
            number,
            subject: subject.to_string(),
            owner: owner.to_string(),
        };
        let record = self
            .config
            .retry
            .run("insert", || self.store.insert(new.clone()))
            .await?;
        info!(number, owner, id = %record.id, "slot reserved");
        Ok(record)
    }

    /// Replace the subject of a reservation owned by `owner`.
    #[instrument(skip(self, subject))]
    pub async fn update(&self, id: Uuid, subject: &str, owner: &str) -> Result<Reservation> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(RegistryError::validation_field(
                "subject must not be empty",
                "subject",
            ));
        }
        let record = self
            .config
            .retry
            .run("update", || self.store.update(id, owner, subject))
            .await?;
        info!(id = %id, number = record.number, "subject updated");
        Ok(record)
    }

    /// Delete a reservation owned by `owner`, freeing its number.
    ///
    /// Linked attachments are cleaned up best-effort afterwards; a cleanup
    /// failure is logged and never blocks the release.
    #[instrument(skip(self))]
    pub async fn release(&self, id: Uuid, owner: &str) -> Result<()> {
        self.config
            .retry
            .run("delete", || self.store.delete(id, owner))
            .await?;

        if let Some(attachments) = &self.attachments {
            let outcome = self
                .config
                .retry
                .run("delete_attachments", || attachments.delete_for(id))
                .await;
            if let Err(err) = outcome {
                warn!(id = %id, error = %err, "linked attachment cleanup failed");
            }
        }

        info!(id = %id, "slot released");
        Ok(())
    }

    /// Linked document references for a reservation (pass-through).
    pub async fn attachments_for(&self, id: Uuid) -> Result<Vec<AttachmentRef>> {
        match &self.attachments {
            Some(attachments) => {
                self.config
                    .retry
                    .run("list_attachments", || attachments.list_for(id))
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Open a read-only change feed for view refresh.
    pub fn subscribe(&self) -> ChangeFeed {
        self.store.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeOp;
    use crate::retry::RetryPolicy;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn test_config() -> RegistryConfig {
        RegistryConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
            ..Default::default()
        }
    }

    fn coordinator() -> ReservationCoordinator {
        ReservationCoordinator::new(test_config(), Arc::new(MemoryStore::new(64))).unwrap()
    }

    struct StaticAttachments {
        refs: Vec<AttachmentRef>,
    }

    #[async_trait]
    impl AttachmentStore for StaticAttachments {
        async fn list_for(&self, reservation: Uuid) -> Result<Vec<AttachmentRef>> {
            Ok(self
                .refs
                .iter()
                .filter(|a| a.reservation == reservation)
                .cloned()
                .collect())
        }

        async fn delete_for(&self, _reservation: Uuid) -> Result<()> {
            Ok(())
        }
    }

    struct BrokenAttachments;

    #[async_trait]
    impl AttachmentStore for BrokenAttachments {
        async fn list_for(&self, _reservation: Uuid) -> Result<Vec<AttachmentRef>> {
            Err(RegistryError::transient("list_attachments"))
        }

        async fn delete_for(&self, _reservation: Uuid) -> Result<()> {
            Err(RegistryError::transient("delete_attachments"))
        }
    }

    #[tokio::test]
    async fn test_reserve_validates_range_and_subject() {
        let coordinator = coordinator();

        let err = coordinator.reserve(0, "Oficio", "user1").await.unwrap_err();
        assert_eq!(err.category(), "validation");

        let err = coordinator.reserve(501, "Oficio", "user1").await.unwrap_err();
        assert_eq!(err.category(), "validation");

        let err = coordinator.reserve(42, "   ", "user1").await.unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[tokio::test]
    async fn test_reserve_trims_subject() {
        let coordinator = coordinator();
        let record = coordinator
            .reserve(42, "  Solicitud compras  ", "user1")
            .await
            .unwrap();
        assert_eq!(record.subject, "Solicitud compras");
    }

    #[tokio::test]
    async fn test_reserve_conflict_leaves_record_untouched() {
        let coordinator = coordinator();
        let first = coordinator.reserve(42, "Solicitud compras", "user1").await.unwrap();

        let err = coordinator.reserve(42, "otra cosa", "user2").await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { number: 42 }));

        let all = coordinator.list_all().await.unwrap();
        assert_eq!(all, vec![first]);
    }

    #[tokio::test]
    async fn test_update_enforces_ownership() {
        let coordinator = coordinator();
        let record = coordinator.reserve(42, "Solicitud compras", "user1").await.unwrap();

        let err = coordinator
            .update(record.id, "Nueva materia", "user2")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { .. }));

        let updated = coordinator
            .update(record.id, "Nueva materia", "user1")
            .await
            .unwrap();
        assert_eq!(updated.subject, "Nueva materia");
        assert_eq!(updated.owner, "user1");
        assert_eq!(updated.number, 42);
    }

    #[tokio::test]
    async fn test_release_and_reuse() {
        let coordinator = coordinator();
        let record = coordinator.reserve(42, "Solicitud compras", "user1").await.unwrap();

        coordinator.release(record.id, "user1").await.unwrap();

        let reused = coordinator.reserve(42, "otro oficio", "user2").await.unwrap();
        assert_eq!(reused.owner, "user2");
    }

    #[tokio::test]
    async fn test_release_survives_broken_attachment_collaborator() {
        let store = Arc::new(MemoryStore::new(64));
        let coordinator = ReservationCoordinator::new(test_config(), store)
            .unwrap()
            .with_attachments(Arc::new(BrokenAttachments));

        let record = coordinator.reserve(42, "Solicitud compras", "user1").await.unwrap();
        coordinator.release(record.id, "user1").await.unwrap();

        assert!(coordinator.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_lookup_passes_through() {
        let store = Arc::new(MemoryStore::new(64));
        let reservation = Uuid::new_v4();
        let linked = AttachmentRef {
            id: Uuid::new_v4(),
            reservation,
            name: "oficio-42.pdf".to_string(),
            url: "https://documents.example/oficio-42.pdf".to_string(),
            created_at: Utc::now(),
        };
        let coordinator = ReservationCoordinator::new(test_config(), store)
            .unwrap()
            .with_attachments(Arc::new(StaticAttachments {
                refs: vec![linked.clone()],
            }));

        let refs = coordinator.attachments_for(reservation).await.unwrap();
        assert_eq!(refs, vec![linked]);

        let none = coordinator.attachments_for(Uuid::new_v4()).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_without_collaborator_lookup_is_empty() {
        let coordinator = coordinator();
        let refs = coordinator.attachments_for(Uuid::new_v4()).await.unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_operations_feed_the_change_stream() {
        let coordinator = coordinator();
        let mut feed = coordinator.subscribe();

        let record = coordinator.reserve(7, "Oficio", "user1").await.unwrap();
        coordinator.release(record.id, "user1").await.unwrap();

        assert_eq!(feed.recv().await.unwrap().op, ChangeOp::Insert);
        assert_eq!(feed.recv().await.unwrap().op, ChangeOp::Delete);
    }
}
