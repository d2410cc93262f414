//! Record validation: signature verification, structural checks and chain links.

use crate::error::ValidationError;
use crate::record::VersionRecord;
use crate::tree::validate_module_name;
use crate::types::ContentId;

/// Validate a record's structure and signature (without chain context).
///
/// This performs:
/// - Module name check
/// - Timestamp ordering
/// - Non-empty content id
/// - Signature verification against the record's own key
pub fn validate_record(record: &VersionRecord) -> Result<(), ValidationError> {
    validate_record_structure(record)?;

    record
        .key
        .verify(&record.signing_bytes(), &record.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}

/// Validate record structure without signature verification.
pub fn validate_record_structure(record: &VersionRecord) -> Result<(), ValidationError> {
    validate_module_name(&record.name)?;

    if record.updated < record.created {
        return Err(ValidationError::TimestampOrder {
            created: record.created,
            updated: record.updated,
        });
    }

    if record.content.is_empty() {
        return Err(ValidationError::StructuralError("empty content id".into()));
    }

    if record.prev.as_ref().is_some_and(ContentId::is_empty) {
        return Err(ValidationError::StructuralError("empty prev id".into()));
    }

    Ok(())
}

/// Validate that `child` correctly extends `parent`, stored under `parent_id`.
///
/// A link keeps the owner key and module name, and points at exactly the
/// parent id.
pub fn validate_link(
    child: &VersionRecord,
    parent_id: &ContentId,
    parent: &VersionRecord,
) -> Result<(), ValidationError> {
    if child.prev.as_ref() != Some(parent_id) {
        return Err(ValidationError::BrokenLink {
            expected: Some(parent_id.clone()),
            got: child.prev.clone(),
        });
    }

    if child.key != parent.key {
        return Err(ValidationError::KeyChanged {
            expected: parent.key.to_hex(),
            got: child.key.to_hex(),
        });
    }

    if child.name != parent.name {
        return Err(ValidationError::NameChanged {
            expected: parent.name.clone(),
            got: child.name.clone(),
        });
    }

    Ok(())
}
