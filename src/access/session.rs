use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::db::models::HilfeDocument;
use crate::error::AppError;

/// Per-viewer unlock state, keyed by (viewer session, document).
///
/// Membership in the stored set is the only source of truth for whether a
/// viewer currently sees a gated unit. Sets only grow, except through
/// [`AccessSessionStore::reset`].
#[async_trait]
pub trait AccessSessionStore: Send + Sync {
    /// The unit indices unlocked so far. An unknown key is an empty set.
    async fn unlocked(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> Result<BTreeSet<usize>, AppError>;

    /// Add `indices` to the stored set. Concurrent calls for the same key
    /// converge to the union of their indices.
    async fn record_unlock(
        &self,
        session_id: &str,
        document_id: &str,
        indices: &BTreeSet<usize>,
    ) -> Result<(), AppError>;

    /// Re-lock every unit of one document for one viewer.
    async fn reset(&self, session_id: &str, document_id: &str) -> Result<(), AppError>;

    /// Drop the unlock state of all viewers for a deleted document.
    async fn forget_document(&self, document_id: &str) -> Result<(), AppError>;

    async fn is_unlocked(
        &self,
        session_id: &str,
        document_id: &str,
        unit_index: usize,
    ) -> Result<bool, AppError> {
        Ok(self
            .unlocked(session_id, document_id)
            .await?
            .contains(&unit_index))
    }

    /// Visibility of every unit of `doc` for this viewer, in document order.
    async fn project_visibility(
        &self,
        session_id: &str,
        doc: &HilfeDocument,
    ) -> Result<Vec<bool>, AppError> {
        let unlocked = self.unlocked(session_id, &doc.id).await?;
        Ok(visibility(doc, &unlocked))
    }
}

/// Units without a lock code are always visible; gated units are visible
/// once their index is in `unlocked`.
pub fn visibility(doc: &HilfeDocument, unlocked: &BTreeSet<usize>) -> Vec<bool> {
    doc.units
        .iter()
        .enumerate()
        .map(|(i, unit)| !unit.is_locked() || unlocked.contains(&i))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    session_id: String,
    document_id: String,
}

impl SessionKey {
    fn new(session_id: &str, document_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            document_id: document_id.to_string(),
        }
    }
}

#[derive(Debug)]
struct SessionEntry {
    unlocked: BTreeSet<usize>,
    last_seen: DateTime<Utc>,
}

/// In-process AccessSessionStore.
///
/// All mutation happens under one mutex, so concurrent unlocks for the same
/// key cannot lose updates.
#[derive(Default)]
pub struct MemoryAccessSessionStore {
    entries: Mutex<HashMap<SessionKey, SessionEntry>>,
}

impl MemoryAccessSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionKey, SessionEntry>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("Access session store poisoned".into()))
    }

    /// Remove entries not touched for longer than `max_idle`.
    ///
    /// Returns the number of removed entries.
    pub fn purge_idle(&self, max_idle: Duration) -> Result<usize, AppError> {
        let cutoff = Utc::now() - max_idle;
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_seen >= cutoff);
        Ok(before - entries.len())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl AccessSessionStore for MemoryAccessSessionStore {
    async fn unlocked(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> Result<BTreeSet<usize>, AppError> {
        let mut entries = self.lock()?;
        Ok(entries
            .get_mut(&SessionKey::new(session_id, document_id))
            .map(|entry| {
                entry.last_seen = Utc::now();
                entry.unlocked.clone()
            })
            .unwrap_or_default())
    }

    async fn record_unlock(
        &self,
        session_id: &str,
        document_id: &str,
        indices: &BTreeSet<usize>,
    ) -> Result<(), AppError> {
        let mut entries = self.lock()?;
        let entry = entries
            .entry(SessionKey::new(session_id, document_id))
            .or_insert_with(|| SessionEntry {
                unlocked: BTreeSet::new(),
                last_seen: Utc::now(),
            });
        entry.unlocked.extend(indices.iter().copied());
        entry.last_seen = Utc::now();
        Ok(())
    }

    async fn reset(&self, session_id: &str, document_id: &str) -> Result<(), AppError> {
        self.lock()?
            .remove(&SessionKey::new(session_id, document_id));
        Ok(())
    }

    async fn forget_document(&self, document_id: &str) -> Result<(), AppError> {
        self.lock()?
            .retain(|key, _| key.document_id != document_id);
        Ok(())
    }
}

/// Stored shape of one (viewer session, document) pair in MongoDB.
#[cfg(feature = "mongo")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct AccessSessionRecord {
    session_id: String,
    document_id: String,
    #[serde(default)]
    unlocked: Vec<i64>,
}

/// MongoDB implementation of the AccessSessionStore.
///
/// `$addToSet` with `$each` makes the union merge atomic on the server.
/// Reads and writes both refresh `updated_at`, which drives the idle-expiry
/// index, so a viewer who keeps reading is never expired.
#[cfg(feature = "mongo")]
pub struct MongoAccessSessionStore {
    collection: mongodb::Collection<AccessSessionRecord>,
}

#[cfg(feature = "mongo")]
impl MongoAccessSessionStore {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("access_sessions"),
        }
    }

    /// Create the unique key index and the idle-expiry index.
    pub async fn ensure_indexes(&self, session_ttl: Duration) -> Result<(), AppError> {
        use mongodb::bson::doc;
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        let key_index = IndexModel::builder()
            .keys(doc! { "session_id": 1, "document_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let ttl = std::time::Duration::from_secs(session_ttl.num_seconds().max(0) as u64);
        let expiry_index = IndexModel::builder()
            .keys(doc! { "updated_at": 1 })
            .options(IndexOptions::builder().expire_after(ttl).build())
            .build();

        self.collection
            .create_indexes([key_index, expiry_index])
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
        use mongodb::error::{ErrorKind, WriteFailure};

        matches!(
            err.kind.as_ref(),
            ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == 11000
        )
    }
}

#[cfg(feature = "mongo")]
#[async_trait]
impl AccessSessionStore for MongoAccessSessionStore {
    async fn unlocked(
        &self,
        session_id: &str,
        document_id: &str,
    ) -> Result<BTreeSet<usize>, AppError> {
        use mongodb::bson::{doc, DateTime};

        let record = self
            .collection
            .find_one_and_update(
                doc! { "session_id": session_id, "document_id": document_id },
                doc! { "$set": { "updated_at": DateTime::now() } },
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(record
            .map(|r| {
                r.unlocked
                    .into_iter()
                    .filter_map(|i| usize::try_from(i).ok())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_unlock(
        &self,
        session_id: &str,
        document_id: &str,
        indices: &BTreeSet<usize>,
    ) -> Result<(), AppError> {
        use mongodb::bson::{doc, DateTime};
        use mongodb::options::UpdateOptions;

        let indices: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
        let filter = doc! { "session_id": session_id, "document_id": document_id };
        let update = doc! {
            "$addToSet": { "unlocked": { "$each": indices } },
            "$set": { "updated_at": DateTime::now() },
        };

        let options = UpdateOptions::builder().upsert(true).build();

        // Two concurrent upserts of a fresh key may race on the unique index;
        // the loser retries as a plain update.
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .collection
                .update_one(filter.clone(), update.clone())
                .with_options(options.clone())
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if attempts < 3 && Self::is_duplicate_key(&e) => {
                    tracing::debug!("Retrying access session upsert after duplicate key");
                }
                Err(e) => return Err(AppError::Database(e.to_string())),
            }
        }
    }

    async fn reset(&self, session_id: &str, document_id: &str) -> Result<(), AppError> {
        use mongodb::bson::doc;

        self.collection
            .delete_one(doc! { "session_id": session_id, "document_id": document_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn forget_document(&self, document_id: &str) -> Result<(), AppError> {
        use mongodb::bson::doc;

        self.collection
            .delete_many(doc! { "document_id": document_id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
