//! # Ledger Primitives
//!
//! Hardcoded limits and constants for the stsdesk ledger.
//! These are compiled into the binary and are immutable at runtime.

/// Maximum length of a record kind slug.
pub const MAX_KIND_LENGTH: usize = 64;

/// Maximum length of a payload field name.
pub const MAX_FIELD_NAME_LENGTH: usize = 128;

/// Maximum number of top-level fields in one payload.
pub const MAX_PAYLOAD_FIELDS: usize = 512;

/// Maximum text carried by a single field, nested values included (64KB).
pub const MAX_FIELD_TEXT_LENGTH: usize = 65536;

/// Maximum nesting depth of list/group values.
pub const MAX_FIELD_DEPTH: usize = 8;

/// Maximum size of one uploaded attachment (10 MiB).
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

/// Maximum number of attachments in one create or amend call.
pub const MAX_UPLOADS_PER_CALL: usize = 24;

/// File extensions accepted for attachments (lowercase, without dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "doc", "docx", "xls", "xlsx", "csv", "txt",
];

/// Minimum digit count of the numeric part of a form code (`QAF-OFD-003`).
pub const FORM_CODE_WIDTH: usize = 3;

/// Counter that issues record ids.
pub const RECORD_ID_COUNTER: &str = "record_id";

/// Counter that issues lineage ids.
pub const LINEAGE_ID_COUNTER: &str = "lineage_id";

/// Prefix of form-code counter names; the form prefix follows.
pub const FORM_COUNTER_PREFIX: &str = "form:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_lowercase_without_dot() {
        for ext in ALLOWED_EXTENSIONS {
            assert_eq!(*ext, ext.to_ascii_lowercase());
            assert!(!ext.starts_with('.'));
        }
    }
}
