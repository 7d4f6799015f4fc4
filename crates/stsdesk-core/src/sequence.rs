//! # Form Code Sequences
//!
//! Form codes (`QAF-OFD-003`) are issued from a named counter per prefix.
//! The counter increment is a single atomic store operation, so two creates
//! can never receive the same number. Numbers may skip when a create fails
//! after its code was issued; they never repeat.

use crate::primitives::{FORM_CODE_WIDTH, FORM_COUNTER_PREFIX};
use crate::store::RecordStore;
use crate::{FormCode, LedgerError};

/// Name of the counter backing `prefix`.
#[must_use]
pub fn counter_name(prefix: &str) -> String {
    format!("{}{}", FORM_COUNTER_PREFIX, prefix)
}

/// Render the `n`-th code of `prefix`.
#[must_use]
pub fn format_code(prefix: &str, n: u64) -> FormCode {
    FormCode(format!("{}-{:0width$}", prefix, n, width = FORM_CODE_WIDTH))
}

/// Issue the next code of `prefix`.
pub fn issue<S: RecordStore + ?Sized>(store: &mut S, prefix: &str) -> Result<FormCode, LedgerError> {
    let n = store.allocate(&counter_name(prefix))?;
    Ok(format_code(prefix, n))
}

/// The code the next `issue` call would return, without consuming it.
pub fn peek<S: RecordStore + ?Sized>(store: &S, prefix: &str) -> Result<FormCode, LedgerError> {
    let current = store.counter(&counter_name(prefix))?;
    Ok(format_code(prefix, current.saturating_add(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn codes_are_zero_padded_to_three_digits() {
        assert_eq!(format_code("QAF-OFD", 3).as_str(), "QAF-OFD-003");
        assert_eq!(format_code("QAF-OFD", 42).as_str(), "QAF-OFD-042");
        assert_eq!(format_code("QAF-OFD", 1234).as_str(), "QAF-OFD-1234");
    }

    #[test]
    fn issue_is_monotonic_per_prefix() {
        let mut store = MemoryStore::new();
        assert_eq!(peek(&store, "QAF-STS").expect("peek").as_str(), "QAF-STS-001");
        assert_eq!(issue(&mut store, "QAF-STS").expect("issue").as_str(), "QAF-STS-001");
        assert_eq!(issue(&mut store, "QAF-STS").expect("issue").as_str(), "QAF-STS-002");
        assert_eq!(issue(&mut store, "QAF-DRL").expect("issue").as_str(), "QAF-DRL-001");
        assert_eq!(peek(&store, "QAF-STS").expect("peek").as_str(), "QAF-STS-003");
    }
}
