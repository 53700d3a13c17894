use std::collections::BTreeSet;

use crate::db::models::HilfeDocument;
use crate::error::AppError;

/// Determine which units a code submitted against `unit_index` unlocks.
///
/// A unit without a code yields an empty set: there is nothing to unlock.
/// A matching code unlocks every unit in the document that shares it, the
/// targeted unit included.
pub fn evaluate(
    doc: &HilfeDocument,
    unit_index: usize,
    submitted_code: &str,
) -> Result<BTreeSet<usize>, AppError> {
    let unit = doc.units.get(unit_index).ok_or_else(|| {
        AppError::NotFound(format!(
            "Unit {} not found in document '{}'",
            unit_index, doc.id
        ))
    })?;

    let Some(expected) = unit.lock_code.as_deref().filter(|c| !c.is_empty()) else {
        return Ok(BTreeSet::new());
    };

    let code = submitted_code.trim();
    if code != expected {
        return Err(AppError::IncorrectCode(unit_index));
    }

    Ok(doc
        .units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.lock_code.as_deref() == Some(code))
        .map(|(i, _)| i)
        .collect())
}
