use async_trait::async_trait;

use crate::db::models::{HilfeDocument, ListQuery};
use crate::error::AppError;

/// Repository trait for study-aid documents.
///
/// Backing stores are interchangeable; one is chosen at startup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Store a newly created document.
    async fn insert(&self, doc: &HilfeDocument) -> Result<(), AppError>;

    /// Find a document by its id.
    async fn find_by_id(&self, id: &str) -> Result<Option<HilfeDocument>, AppError>;

    /// Replace a stored document wholesale.
    ///
    /// When `expected_revision` is set, the stored revision must match it,
    /// otherwise `Conflict` is returned. Fails with `NotFound` if absent.
    async fn replace(
        &self,
        doc: &HilfeDocument,
        expected_revision: Option<i64>,
    ) -> Result<(), AppError>;

    /// Delete a document by id. Fails with `NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<(), AppError>;

    /// List the documents created by `owner_id`, filtered and sorted by `query`.
    async fn list_by_owner(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<HilfeDocument>, AppError>;
}

/// MongoDB implementation of the DocumentRepository.
#[cfg(feature = "mongo")]
pub struct MongoDocumentRepository {
    collection: mongodb::Collection<HilfeDocument>,
}

#[cfg(feature = "mongo")]
impl MongoDocumentRepository {
    pub fn new(db: &mongodb::Database) -> Self {
        Self {
            collection: db.collection("hilfen"),
        }
    }
}

#[cfg(feature = "mongo")]
#[async_trait]
impl DocumentRepository for MongoDocumentRepository {
    async fn insert(&self, doc: &HilfeDocument) -> Result<(), AppError> {
        self.collection
            .insert_one(doc)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<HilfeDocument>, AppError> {
        use mongodb::bson::doc;

        self.collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn replace(
        &self,
        doc: &HilfeDocument,
        expected_revision: Option<i64>,
    ) -> Result<(), AppError> {
        use mongodb::bson::doc;

        let mut filter = doc! { "_id": &doc.id };
        if let Some(revision) = expected_revision {
            filter.insert("revision", revision);
        }

        let result = self
            .collection
            .replace_one(filter, doc)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.matched_count == 0 {
            // Distinguish a stale revision from a missing document
            return match self.find_by_id(&doc.id).await? {
                Some(current) => Err(AppError::Conflict(format!(
                    "Document '{}' is at revision {}",
                    doc.id, current.revision
                ))),
                None => Err(AppError::NotFound(format!("Document '{}' not found", doc.id))),
            };
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        use mongodb::bson::doc;

        let result = self
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.deleted_count == 0 {
            return Err(AppError::NotFound(format!("Document '{}' not found", id)));
        }

        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<HilfeDocument>, AppError> {
        use crate::db::models::SortOrder;
        use futures::TryStreamExt;
        use mongodb::bson::doc;
        use mongodb::options::FindOptions;

        let mut filter = doc! { "owner_id": owner_id };
        if let Some(subject) = &query.subject {
            filter.insert("subject", subject);
        }

        // Timestamps are stored as RFC 3339 strings, which sort chronologically.
        let sort = match query.sort.unwrap_or_default() {
            SortOrder::DateAsc => doc! { "created_at": 1 },
            SortOrder::DateDesc => doc! { "created_at": -1 },
            SortOrder::TitleAsc => doc! { "title": 1 },
            SortOrder::TitleDesc => doc! { "title": -1 },
        };
        let options = FindOptions::builder().sort(sort).build();

        let cursor = self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
