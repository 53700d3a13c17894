use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A published study aid stored in the document store.
///
/// Owns its units; edits replace the whole unit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HilfeDocument {
    /// Opaque identifier, also the token in the share link.
    #[serde(rename = "_id")]
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Optional subject used for dashboard filtering.
    #[serde(default)]
    pub subject: Option<String>,
    /// Identifier of the creating account. `None` for anonymous creations.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Ordered units. Order is significant.
    pub units: Vec<HilfeUnit>,
    /// Incremented on every replace.
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named piece of content within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HilfeUnit {
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Shared secret gating this unit. Never empty when present.
    #[serde(default)]
    pub lock_code: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl HilfeUnit {
    /// A unit is gated if and only if it carries a non-empty lock code.
    pub fn is_locked(&self) -> bool {
        self.lock_code.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Reference to an uploaded file, as handed over by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Storage path of the file.
    pub path: String,
    /// Filename as supplied by the uploader.
    pub original_name: String,
}

/// One unit as submitted by the creator on create or replace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub lock_code: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl UnitSpec {
    /// Normalize a submitted unit at position `index`.
    ///
    /// An empty name becomes `Unit <index+1>`. A unit flagged as locked with
    /// an empty code is stored unlocked.
    pub fn normalize(self, index: usize) -> Result<HilfeUnit, AppError> {
        if let Some(bad) = self.attachments.iter().find(|a| a.path.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Unit {} has an attachment without a path ('{}')",
                index + 1,
                bad.original_name
            )));
        }

        let name = match self.name.trim() {
            "" => format!("Unit {}", index + 1),
            trimmed => trimmed.to_string(),
        };

        let lock_code = if self.locked {
            self.lock_code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
        } else {
            None
        };

        Ok(HilfeUnit {
            name,
            content: self.content,
            lock_code,
            attachments: self.attachments,
        })
    }
}

/// Request payload for creating or replacing a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub units: Vec<UnitSpec>,
    /// Only honoured on replace. When set and stale the replace is rejected.
    #[serde(default)]
    pub expected_revision: Option<i64>,
}

/// Validated title, subject and units ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDraft {
    pub title: String,
    pub subject: Option<String>,
    pub units: Vec<HilfeUnit>,
}

impl DocumentRequest {
    /// Validate the request and normalize every unit.
    pub fn into_draft(self) -> Result<DocumentDraft, AppError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Title cannot be empty".into()));
        }
        if self.units.is_empty() {
            return Err(AppError::Validation(
                "A document needs at least one unit".into(),
            ));
        }

        let units = self
            .units
            .into_iter()
            .enumerate()
            .map(|(i, spec)| spec.normalize(i))
            .collect::<Result<Vec<_>, _>>()?;

        let subject = self
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(DocumentDraft {
            title,
            subject,
            units,
        })
    }
}

impl HilfeDocument {
    /// Build a fresh document from a validated draft with a newly generated id.
    pub fn from_draft(draft: DocumentDraft, owner_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            title: draft.title,
            subject: draft.subject,
            owner_id,
            units: draft.units,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Return the wholesale replacement of this document.
    ///
    /// Identity, owner and creation time carry over.
    pub fn replaced_with(&self, draft: DocumentDraft) -> Self {
        Self {
            id: self.id.clone(),
            title: draft.title,
            subject: draft.subject,
            owner_id: self.owner_id.clone(),
            units: draft.units,
            revision: self.revision + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn locked_unit_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_locked()).count()
    }

    /// True when every index carries the same lock code in both documents.
    ///
    /// Unlock state is stored per index, so it only stays meaningful across
    /// a replace that keeps this property.
    pub fn same_gating(&self, other: &HilfeDocument) -> bool {
        self.units.len() == other.units.len()
            && self
                .units
                .iter()
                .zip(&other.units)
                .all(|(a, b)| a.lock_code == b.lock_code)
    }
}

/// Response after creating a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
    /// Link to hand to viewers (and to the QR renderer).
    pub share_url: String,
}

/// Dashboard sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    DateAsc,
    #[default]
    DateDesc,
    TitleAsc,
    TitleDesc,
}

impl SortOrder {
    /// Sort documents in place.
    pub fn apply(self, docs: &mut [HilfeDocument]) {
        match self {
            SortOrder::DateAsc => docs.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::DateDesc => docs.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::TitleAsc => docs.sort_by(|a, b| a.title.cmp(&b.title)),
            SortOrder::TitleDesc => docs.sort_by(|a, b| b.title.cmp(&a.title)),
        }
    }
}

/// Query parameters of the creator dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

/// One row of the creator dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub subject: Option<String>,
    pub unit_count: usize,
    pub locked_unit_count: usize,
    pub share_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The creator dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub hilfen: Vec<DocumentSummary>,
    /// Distinct subjects over all of the owner's documents.
    pub subjects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, locked: bool, code: Option<&str>) -> UnitSpec {
        UnitSpec {
            name: name.to_string(),
            content: "text".to_string(),
            locked,
            lock_code: code.map(str::to_string),
            attachments: vec![],
        }
    }

    #[test]
    fn test_empty_name_gets_positional_placeholder() {
        let unit = spec("  ", false, None).normalize(2).unwrap();
        assert_eq!(unit.name, "Unit 3");
    }

    #[test]
    fn test_locked_without_code_is_unlocked() {
        let unit = spec("A", true, Some("   ")).normalize(0).unwrap();
        assert_eq!(unit.lock_code, None);
        assert!(!unit.is_locked());

        let unit = spec("A", true, None).normalize(0).unwrap();
        assert!(!unit.is_locked());
    }

    #[test]
    fn test_code_ignored_when_not_locked() {
        let unit = spec("A", false, Some("42")).normalize(0).unwrap();
        assert_eq!(unit.lock_code, None);
    }

    #[test]
    fn test_code_is_trimmed() {
        let unit = spec("A", true, Some(" 42 ")).normalize(0).unwrap();
        assert_eq!(unit.lock_code.as_deref(), Some("42"));
        assert!(unit.is_locked());
    }

    #[test]
    fn test_attachment_without_path_rejected() {
        let mut s = spec("A", false, None);
        s.attachments.push(Attachment {
            path: "".to_string(),
            original_name: "notes.pdf".to_string(),
        });
        match s.normalize(0).unwrap_err() {
            AppError::Validation(msg) => assert!(msg.contains("notes.pdf")),
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_request_without_units_rejected() {
        let req = DocumentRequest {
            title: "Algebra".to_string(),
            ..Default::default()
        };
        assert!(matches!(req.into_draft(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_request_with_blank_title_rejected() {
        let req = DocumentRequest {
            title: "  ".to_string(),
            units: vec![spec("A", false, None)],
            ..Default::default()
        };
        assert!(matches!(req.into_draft(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_request_preserves_unit_order() {
        let req = DocumentRequest {
            title: "Algebra".to_string(),
            subject: Some("  ".to_string()),
            units: vec![spec("C", false, None), spec("A", false, None), spec("B", false, None)],
            expected_revision: None,
        };
        let draft = req.into_draft().unwrap();
        let names: Vec<&str> = draft.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
        assert_eq!(draft.subject, None);
    }

    #[test]
    fn test_replaced_with_keeps_identity() {
        let draft = DocumentDraft {
            title: "Algebra".to_string(),
            subject: Some("Math".to_string()),
            units: vec![spec("A", false, None).normalize(0).unwrap()],
        };
        let doc = HilfeDocument::from_draft(draft.clone(), Some("demo-teacher".to_string()));
        let mut next = draft;
        next.title = "Algebra II".to_string();
        let replaced = doc.replaced_with(next);

        assert_eq!(replaced.id, doc.id);
        assert_eq!(replaced.owner_id, doc.owner_id);
        assert_eq!(replaced.created_at, doc.created_at);
        assert_eq!(replaced.revision, 1);
        assert_eq!(replaced.title, "Algebra II");
    }

    #[test]
    fn test_same_gating_compares_codes_per_index() {
        let draft = DocumentDraft {
            title: "Algebra".to_string(),
            subject: None,
            units: vec![
                spec("A", true, Some("42")).normalize(0).unwrap(),
                spec("B", false, None).normalize(1).unwrap(),
            ],
        };
        let doc = HilfeDocument::from_draft(draft.clone(), None);

        let mut renamed = draft.clone();
        renamed.units[1].content = "other text".to_string();
        assert!(doc.same_gating(&doc.replaced_with(renamed)));

        let mut recoded = draft.clone();
        recoded.units[0].lock_code = Some("43".to_string());
        assert!(!doc.same_gating(&doc.replaced_with(recoded)));

        let mut swapped = draft.clone();
        swapped.units.reverse();
        assert!(!doc.same_gating(&doc.replaced_with(swapped)));

        let mut shorter = draft;
        shorter.units.pop();
        assert!(!doc.same_gating(&doc.replaced_with(shorter)));
    }

    #[test]
    fn test_document_defaults_on_deserialize() {
        let json = r###"{
            "_id": "abc",
            "title": "Algebra",
            "units": [{ "name": "A" }],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"###;

        let doc: HilfeDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.owner_id, None);
        assert_eq!(doc.revision, 0);
        assert_eq!(doc.units[0].content, "");
        assert!(!doc.units[0].is_locked());
    }

    #[test]
    fn test_sort_order_parsing() {
        let q: ListQuery = serde_json::from_str(r#"{"sort": "title_desc"}"#).unwrap();
        assert_eq!(q.sort, Some(SortOrder::TitleDesc));
        assert_eq!(SortOrder::default(), SortOrder::DateDesc);
    }
}
