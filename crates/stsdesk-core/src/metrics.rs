//! # Dashboard Metrics
//!
//! Counts computed over the heads of one kind at request time: status
//! breakdown, totals per location and quarterly buckets for one year.

use crate::{FormStatus, VersionedRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used for heads whose location field is missing or blank.
pub const UNSPECIFIED_LOCATION: &str = "unspecified";

/// Aggregated view of one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindMetrics {
    /// Number of lineages (one head each).
    pub lineages: usize,
    /// Number of stored versions across those lineages.
    pub versions: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Heads per location, ordered by location name.
    pub by_location: BTreeMap<String, usize>,
    /// Year the quarterly buckets refer to, if one was requested or found.
    pub year: Option<i32>,
    /// Heads dated in Q1..Q4 of `year`.
    pub quarters: [usize; 4],
}

impl KindMetrics {
    /// Compute metrics from `heads`.
    ///
    /// `versions` is the total stored version count for the kind. When
    /// `year` is `None` the most recent year present is used.
    #[must_use]
    pub fn compute(
        heads: &[VersionedRecord],
        versions: usize,
        location_field: Option<&str>,
        year: Option<i32>,
    ) -> Self {
        let mut metrics = Self {
            lineages: heads.len(),
            versions,
            year: year.or_else(|| {
                heads
                    .iter()
                    .filter_map(|r| r.effective_date().map(|d| d.year))
                    .max()
            }),
            ..Self::default()
        };

        for record in heads {
            match record.status {
                FormStatus::Pending => metrics.pending += 1,
                FormStatus::Approved => metrics.approved += 1,
                FormStatus::Rejected => metrics.rejected += 1,
            }

            let location = location_field
                .and_then(|f| record.text_field(f))
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(UNSPECIFIED_LOCATION);
            *metrics.by_location.entry(location.to_string()).or_insert(0) += 1;

            if let (Some(year), Some(date)) = (metrics.year, record.effective_date())
                && date.year == year
            {
                let q = usize::from(date.quarter()).saturating_sub(1).min(3);
                metrics.quarters[q] += 1;
            }
        }
        metrics
    }

    /// Count for one status.
    #[must_use]
    pub fn status_count(&self, status: FormStatus) -> usize {
        match status {
            FormStatus::Pending => self.pending,
            FormStatus::Approved => self.approved,
            FormStatus::Rejected => self.rejected,
        }
    }
}
