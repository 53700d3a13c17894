use crate::db::models::HilfeDocument;
use crate::error::AppError;

/// Outcome of the ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Allowed,
    Denied,
}

/// Compare the document's creator with the requester.
///
/// Denied when there is no requester, when the document has no owner, or
/// when the two differ. Gates edit and delete only, never reading.
pub fn authorize(doc: &HilfeDocument, requester_id: Option<&str>) -> Ownership {
    match (doc.owner_id.as_deref(), requester_id) {
        (Some(owner), Some(requester)) if owner == requester => Ownership::Allowed,
        _ => Ownership::Denied,
    }
}

/// [`authorize`] as a `Result`, for use with `?`.
pub fn require_owner(doc: &HilfeDocument, requester_id: Option<&str>) -> Result<(), AppError> {
    match authorize(doc, requester_id) {
        Ownership::Allowed => Ok(()),
        Ownership::Denied => {
            tracing::warn!(
                document_id = %doc.id,
                requester = requester_id.unwrap_or("<anonymous>"),
                "Ownership check failed"
            );
            Err(AppError::Forbidden(format!(
                "Not allowed to modify document '{}'",
                doc.id
            )))
        }
    }
}
