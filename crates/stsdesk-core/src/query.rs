//! # Lineage Listing
//!
//! Filters applied to the heads of one kind, plus the year menu shown next
//! to the list.

use crate::{FormStatus, LedgerError, VersionedRecord};
use std::collections::BTreeSet;

/// Filter over head records. Every `None` matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub year: Option<i32>,
    /// 1 to 12.
    pub month: Option<u8>,
    pub status: Option<FormStatus>,
}

impl ListFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn month(mut self, month: u8) -> Self {
        self.month = Some(month);
        self
    }

    #[must_use]
    pub fn status(mut self, status: FormStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if let Some(month) = self.month
            && !(1..=12).contains(&month)
        {
            return Err(LedgerError::InvalidInput(format!(
                "month must be 1..=12, got {}",
                month
            )));
        }
        Ok(())
    }

    /// Whether `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &VersionedRecord) -> bool {
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if self.year.is_none() && self.month.is_none() {
            return true;
        }
        let Some(date) = record.effective_date() else {
            return false;
        };
        self.year.is_none_or(|y| date.year == y) && self.month.is_none_or(|m| date.month == m)
    }
}

/// Result of a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Matching heads ordered by lineage id.
    pub records: Vec<VersionedRecord>,
    /// Distinct years across all heads of the kind, newest first.
    pub years: Vec<i32>,
}

impl Listing {
    /// Filter `heads` and collect the year menu from the unfiltered set.
    #[must_use]
    pub fn build(heads: Vec<VersionedRecord>, filter: &ListFilter) -> Self {
        let years: BTreeSet<i32> = heads
            .iter()
            .filter_map(|r| r.effective_date().map(|d| d.year))
            .collect();
        let records = heads.into_iter().filter(|r| filter.matches(r)).collect();
        Self {
            records,
            years: years.into_iter().rev().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordDate;
    use crate::store::tests::record;

    fn dated(id: u64, date: &str, status: FormStatus) -> VersionedRecord {
        let mut r = record(id, id, 10);
        r.recorded_on = Some(RecordDate::parse(date).expect("date"));
        r.status = status;
        r
    }

    #[test]
    fn year_month_and_status_filters() {
        let heads = vec![
            dated(1, "2023-02-10", FormStatus::Approved),
            dated(2, "2024-02-11", FormStatus::Pending),
            dated(3, "2024-07-01", FormStatus::Approved),
        ];

        let all = Listing::build(heads.clone(), &ListFilter::new());
        assert_eq!(all.records.len(), 3);
        assert_eq!(all.years, vec![2024, 2023]);

        let y2024 = Listing::build(heads.clone(), &ListFilter::new().year(2024));
        assert_eq!(y2024.records.len(), 2);
        // Year menu ignores the filter.
        assert_eq!(y2024.years, vec![2024, 2023]);

        let feb = Listing::build(heads.clone(), &ListFilter::new().month(2));
        assert_eq!(feb.records.len(), 2);

        let approved_2024 = Listing::build(
            heads,
            &ListFilter::new().year(2024).status(FormStatus::Approved),
        );
        assert_eq!(approved_2024.records.len(), 1);
        assert_eq!(approved_2024.records[0].id.0, 3);
    }

    #[test]
    fn undated_records_fall_back_to_creation_date() {
        // created_at in the record helper is 2023-11-14.
        let r = record(1, 1, 10);
        assert!(ListFilter::new().year(2023).matches(&r));
        assert!(!ListFilter::new().year(2024).matches(&r));
    }

    #[test]
    fn month_out_of_range_is_rejected() {
        assert!(ListFilter::new().month(13).validate().is_err());
        assert!(ListFilter::new().month(0).validate().is_err());
        assert!(ListFilter::new().month(12).validate().is_ok());
    }
}
