//! # Record Kinds
//!
//! Every form type the ledger accepts is described by a [`KindSpec`]:
//! its slug, the prefix of its form codes, the fields that must be filled
//! in at creation, and which payload fields carry its business date and
//! location.

use crate::types::{LedgerError, Payload, RecordKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description of one form type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSpec {
    pub name: String,
    /// Form code prefix (`QAF-OFD`); kinds without one get no form code.
    #[serde(default)]
    pub form_prefix: Option<String>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Payload field holding the business date (`YYYY-MM-DD`).
    #[serde(default)]
    pub date_field: Option<String>,
    /// Payload field holding the location used by dashboard totals.
    #[serde(default)]
    pub location_field: Option<String>,
}

impl KindSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            form_prefix: None,
            required_fields: Vec::new(),
            date_field: None,
            location_field: None,
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.form_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_required(mut self, fields: &[&str]) -> Self {
        self.required_fields = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_date_field(mut self, field: impl Into<String>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_location_field(mut self, field: impl Into<String>) -> Self {
        self.location_field = Some(field.into());
        self
    }

    /// Names of required fields missing from `payload`, in declaration order.
    #[must_use]
    pub fn missing_fields(&self, payload: &Payload) -> Vec<&str> {
        self.required_fields
            .iter()
            .filter(|f| !payload.get(f.as_str()).is_some_and(|v| v.is_present()))
            .map(String::as_str)
            .collect()
    }

    fn validate(&self) -> Result<RecordKind, LedgerError> {
        let kind = RecordKind::new(self.name.clone())?;
        if let Some(prefix) = &self.form_prefix {
            let valid = !prefix.is_empty()
                && prefix
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-');
            if !valid {
                return Err(LedgerError::InvalidInput(format!(
                    "form prefix '{}' of kind '{}' must be uppercase letters, digits or '-'",
                    prefix, self.name
                )));
            }
        }
        Ok(kind)
    }
}

/// The set of kinds a ledger accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindRegistry {
    kinds: BTreeMap<RecordKind, KindSpec>,
}

impl KindRegistry {
    /// Build a registry, rejecting invalid slugs, bad prefixes and duplicates.
    pub fn new(specs: Vec<KindSpec>) -> Result<Self, LedgerError> {
        let mut kinds = BTreeMap::new();
        for spec in specs {
            let kind = spec.validate()?;
            if kinds.insert(kind, spec.clone()).is_some() {
                return Err(LedgerError::InvalidInput(format!(
                    "record kind '{}' declared twice",
                    spec.name
                )));
            }
        }
        Ok(Self { kinds })
    }

    /// Resolve a slug to its spec.
    pub fn resolve(&self, slug: &str) -> Result<(RecordKind, &KindSpec), LedgerError> {
        let kind = RecordKind::new(slug).map_err(|_| LedgerError::UnknownKind(slug.to_string()))?;
        match self.kinds.get_key_value(&kind) {
            Some((k, spec)) => Ok((k.clone(), spec)),
            None => Err(LedgerError::UnknownKind(slug.to_string())),
        }
    }

    pub fn get(&self, kind: &RecordKind) -> Option<&KindSpec> {
        self.kinds.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordKind, &KindSpec)> {
        self.kinds.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for KindRegistry {
    /// The form families shipped out of the box.
    fn default() -> Self {
        let specs = vec![
            KindSpec::new("sts-operation")
                .with_prefix("QAF-STS")
                .with_required(&["mother_vessel", "daughter_vessel", "operation_date"])
                .with_date_field("operation_date")
                .with_location_field("location"),
            KindSpec::new("poac-cross-competency")
                .with_prefix("QAF-POAC")
                .with_required(&["poac_name", "evaluation_date"])
                .with_date_field("evaluation_date")
                .with_location_field("location"),
            KindSpec::new("ofd-inspection")
                .with_prefix("QAF-OFD")
                .with_required(&["inspection_date"])
                .with_date_field("inspection_date")
                .with_location_field("location"),
            KindSpec::new("drill-report")
                .with_prefix("QAF-DRL")
                .with_required(&["drill_type", "drill_date"])
                .with_date_field("drill_date")
                .with_location_field("location"),
        ];
        let kinds = specs
            .into_iter()
            .filter_map(|spec| RecordKind::new(spec.name.clone()).ok().map(|k| (k, spec)))
            .collect();
        Self { kinds }
    }
}
