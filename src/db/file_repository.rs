use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::models::{HilfeDocument, ListQuery};
use crate::db::repository::DocumentRepository;
use crate::error::AppError;

/// Flat-file implementation of the DocumentRepository.
///
/// Each document lives in `<root>/<id>.json`. Writes go through a temporary
/// file and a rename so readers never observe a half-written document.
pub struct FileDocumentRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDocumentRepository {
    /// Open (and create if needed) a repository rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            AppError::Storage(format!("Failed to create '{}': {}", root.display(), e))
        })?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Ids are generated by us; anything else cannot name a stored document.
    fn is_valid_id(id: &str) -> bool {
        !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    async fn read_document(path: &Path) -> Result<Option<HilfeDocument>, AppError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                AppError::Storage(format!("Corrupt document '{}': {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to read '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_document(&self, doc: &HilfeDocument) -> Result<(), AppError> {
        let path = self.path_for(&doc.id);
        let tmp = self.root.join(format!(".{}.json.tmp", doc.id));

        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| AppError::Internal(format!("Failed to serialize document: {}", e)))?;

        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write '{}': {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AppError::Storage(format!("Failed to move '{}': {}", path.display(), e))
        })?;

        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for FileDocumentRepository {
    async fn insert(&self, doc: &HilfeDocument) -> Result<(), AppError> {
        if !Self::is_valid_id(&doc.id) {
            return Err(AppError::BadRequest(format!("Invalid document id '{}'", doc.id)));
        }

        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(self.path_for(&doc.id))
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
        {
            return Err(AppError::Conflict(format!("Document '{}' already exists", doc.id)));
        }

        self.write_document(doc).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<HilfeDocument>, AppError> {
        if !Self::is_valid_id(id) {
            return Ok(None);
        }
        Self::read_document(&self.path_for(id)).await
    }

    async fn replace(
        &self,
        doc: &HilfeDocument,
        expected_revision: Option<i64>,
    ) -> Result<(), AppError> {
        if !Self::is_valid_id(&doc.id) {
            return Err(AppError::NotFound(format!("Document '{}' not found", doc.id)));
        }

        let _guard = self.write_lock.lock().await;
        let current = Self::read_document(&self.path_for(&doc.id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", doc.id)))?;

        if let Some(expected) = expected_revision {
            if current.revision != expected {
                return Err(AppError::Conflict(format!(
                    "Document '{}' is at revision {}",
                    doc.id, current.revision
                )));
            }
        }

        self.write_document(doc).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        if !Self::is_valid_id(id) {
            return Err(AppError::NotFound(format!("Document '{}' not found", id)));
        }

        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Document '{}' not found", id)))
            }
            Err(e) => Err(AppError::Storage(format!("Failed to delete '{}': {}", id, e))),
        }
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        query: &ListQuery,
    ) -> Result<Vec<HilfeDocument>, AppError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list documents: {}", e)))?;

        let mut documents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
        {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_document {
                continue;
            }

            let Some(doc) = Self::read_document(&path).await? else {
                continue;
            };
            if doc.owner_id.as_deref() != Some(owner_id) {
                continue;
            }
            if let Some(subject) = &query.subject {
                if doc.subject.as_ref() != Some(subject) {
                    continue;
                }
            }
            documents.push(doc);
        }

        query.sort.unwrap_or_default().apply(&mut documents);
        Ok(documents)
    }
}
