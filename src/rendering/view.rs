use serde::{Deserialize, Serialize};

use crate::db::models::{Attachment, HilfeDocument};
use crate::rendering::markdown::render_markdown;

/// Viewer-facing projection of a document.
///
/// Lock codes never appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub units: Vec<UnitView>,
}

/// One unit as seen by a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub index: usize,
    pub name: String,
    pub visible: bool,
    /// True iff the unit is gated and not yet visible to this viewer.
    pub show_code_form: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Set when the last code submitted for this unit was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combine a document with a viewer's visibility projection.
///
/// `visibility` is in document order; a missing entry counts as hidden.
/// `failed_index` marks the unit whose code was just rejected.
pub fn compose(
    doc: &HilfeDocument,
    visibility: &[bool],
    failed_index: Option<usize>,
) -> DocumentView {
    let units = doc
        .units
        .iter()
        .enumerate()
        .map(|(index, unit)| {
            let visible = visibility.get(index).copied().unwrap_or(false);
            let show_code_form = unit.is_locked() && !visible;
            let error = (show_code_form && failed_index == Some(index))
                .then(|| "Incorrect code".to_string());

            UnitView {
                index,
                name: unit.name.clone(),
                visible,
                show_code_form,
                content: visible.then(|| unit.content.clone()),
                content_html: visible.then(|| render_markdown(&unit.content)),
                attachments: visible.then(|| unit.attachments.clone()),
                error,
            }
        })
        .collect();

    DocumentView {
        id: doc.id.clone(),
        title: doc.title.clone(),
        subject: doc.subject.clone(),
        units,
    }
}
