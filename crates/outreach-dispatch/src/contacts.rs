//! Source of validated recipient snapshots.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use outreach_campaign::domain::definition::Recipient;
use outreach_core::error::DomainError;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Supplies the validated, deduplicated recipients of a contact list.
#[async_trait]
pub trait ContactRegistry: Send + Sync {
    /// Returns a snapshot of the list's recipients.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for unknown lists.
    async fn recipients(&self, list_id: Uuid) -> Result<Vec<Recipient>, DomainError>;
}

/// Contact lists held in memory, filled through the HTTP API.
#[derive(Debug, Default)]
pub struct InMemoryContactRegistry {
    lists: RwLock<HashMap<Uuid, Vec<Recipient>>>,
}

fn normalized(address: &str) -> String {
    address.chars().filter(char::is_ascii_digit).collect()
}

impl InMemoryContactRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces a contact list and returns how many recipients were
    /// kept. Recipients whose address repeats an earlier one (comparing digits
    /// only) are dropped.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the list is empty or an address
    /// has no digits.
    pub async fn put_list(
        &self,
        list_id: Uuid,
        recipients: Vec<Recipient>,
    ) -> Result<usize, DomainError> {
        if recipients.is_empty() {
            return Err(DomainError::Validation(
                "contact list must contain at least one recipient".into(),
            ));
        }
        if let Some(invalid) = recipients.iter().find(|r| !r.has_dialable_address()) {
            return Err(DomainError::Validation(format!(
                "recipient {} has no dialable address: {:?}",
                invalid.id, invalid.address
            )));
        }

        let mut seen = HashSet::new();
        let unique: Vec<Recipient> = recipients
            .into_iter()
            .filter(|r| seen.insert(normalized(&r.address)))
            .collect();
        let kept = unique.len();
        self.lists.write().await.insert(list_id, unique);
        Ok(kept)
    }
}

#[async_trait]
impl ContactRegistry for InMemoryContactRegistry {
    async fn recipients(&self, list_id: Uuid) -> Result<Vec<Recipient>, DomainError> {
        self.lists
            .read()
            .await
            .get(&list_id)
            .cloned()
            .ok_or(DomainError::AggregateNotFound(list_id))
    }
}
