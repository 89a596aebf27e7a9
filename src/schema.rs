//! Column detection for loosely named CSV exports.
//!
//! Each semantic field has an ordered list of candidate header names. A
//! lookup makes two passes: first a case-insensitive exact match over every
//! candidate, then a case-insensitive substring match over every candidate.
//! An exact hit for a late candidate therefore beats a substring hit for an
//! early one.

use serde::Serialize;

pub const WEEK_CANDIDATES: &[&str] = &["week", "week_start", "week_number", "week_index"];
pub const SERVICE_CANDIDATES: &[&str] = &["service", "department", "unit", "ward"];
pub const REQUESTS_CANDIDATES: &[&str] =
    &["patients_request", "patient_requests", "requests", "demand"];
pub const ADMISSIONS_CANDIDATES: &[&str] =
    &["patients_admitted", "admitted", "admissions", "accepted"];
pub const REFUSALS_CANDIDATES: &[&str] =
    &["patients_refused", "refused", "refusals", "rejections"];
pub const BEDS_CANDIDATES: &[&str] = &["available_beds", "beds", "bed_available"];
pub const EVENT_CANDIDATES: &[&str] = &["event", "events", "special_event"];
pub const MORALE_CANDIDATES: &[&str] = &["staff_morale", "morale"];
pub const SATISFACTION_CANDIDATES: &[&str] = &["patient_satisfaction", "satisfaction"];

pub const SCHEDULE_WEEK_CANDIDATES: &[&str] = &["week"];
pub const SCHEDULE_SERVICE_CANDIDATES: &[&str] = &["service"];
pub const SCHEDULE_PRESENT_CANDIDATES: &[&str] = &["present"];

/// Names given to the derived columns in the column map.
pub const AVAILABLE_STAFF: &str = "available_staff";
pub const REFUSAL_RATE: &str = "refusal_rate";
pub const BED_UTILIZATION: &str = "bed_utilization";
pub const PATIENTS_PER_STAFF: &str = "patients_per_staff";
pub const DEMAND_LEVEL: &str = "demand_level";
pub const REFUSAL_LEVEL: &str = "refusal_level";

/// Pick the real column for a semantic field, or `None`.
pub fn resolve_column<'a, S: AsRef<str>>(columns: &'a [S], candidates: &[&str]) -> Option<&'a str> {
    for cand in candidates {
        let cand = cand.to_lowercase();
        if let Some(hit) = columns.iter().find(|c| c.as_ref().to_lowercase() == cand) {
            return Some(hit.as_ref());
        }
    }
    // substring containment, still in candidate order
    for cand in candidates {
        let cand = cand.to_lowercase();
        if let Some(hit) = columns.iter().find(|c| c.as_ref().to_lowercase().contains(&cand)) {
            return Some(hit.as_ref());
        }
    }
    None
}

/// Semantic field → physical column binding for the loaded weekly table.
///
/// Built once by the loader and extended once by the metric deriver; every
/// optional entry is `None` when the field is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMap {
    pub week: String,
    pub service: String,
    pub requests: Option<String>,
    pub admissions: Option<String>,
    pub refusals: Option<String>,
    pub beds: Option<String>,
    pub event: Option<String>,
    pub morale: Option<String>,
    pub satisfaction: Option<String>,
    pub staff: Option<String>,
    pub refusal_rate: Option<String>,
    pub bed_utilization: Option<String>,
    pub patients_per_staff: Option<String>,
    pub demand_level: Option<String>,
    pub refusal_level: Option<String>,
}

impl ColumnMap {
    /// Map with only the mandatory keys bound.
    pub fn new(week: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            week: week.into(),
            service: service.into(),
            requests: None,
            admissions: None,
            refusals: None,
            beds: None,
            event: None,
            morale: None,
            satisfaction: None,
            staff: None,
            refusal_rate: None,
            bed_utilization: None,
            patients_per_staff: None,
            demand_level: None,
            refusal_level: None,
        }
    }

    /// Names of the derived columns currently bound, in derivation order.
    pub fn derived_columns(&self) -> Vec<String> {
        [
            &self.staff,
            &self.refusal_rate,
            &self.bed_utilization,
            &self.patients_per_staff,
            &self.demand_level,
            &self.refusal_level,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_beats_earlier_substring_match() {
        let cols = ["xb", "a"];
        assert_eq!(resolve_column(&cols, &["a", "b"]), Some("a"));
        assert_eq!(resolve_column(&cols, &["b", "a"]), Some("a"));
    }

    #[test]
    fn exact_match_is_case_insensitive_and_keeps_real_name() {
        let cols = ["Week", "SERVICE"];
        assert_eq!(resolve_column(&cols, WEEK_CANDIDATES), Some("Week"));
        assert_eq!(resolve_column(&cols, SERVICE_CANDIDATES), Some("SERVICE"));
    }

    #[test]
    fn earlier_candidate_wins_within_exact_pass() {
        let cols = ["admissions", "patients_admitted"];
        assert_eq!(resolve_column(&cols, ADMISSIONS_CANDIDATES), Some("patients_admitted"));
    }

    #[test]
    fn substring_pass_scans_columns_in_order() {
        let cols = ["total_requests_week", "requests_adjusted"];
        assert_eq!(resolve_column(&cols, REQUESTS_CANDIDATES), Some("total_requests_week"));
    }

    #[test]
    fn unresolved_field_is_none() {
        let cols = ["week", "service"];
        assert_eq!(resolve_column(&cols, BEDS_CANDIDATES), None);
    }

    #[test]
    fn derived_columns_lists_bound_entries() {
        let mut map = ColumnMap::new("week", "service");
        assert!(map.derived_columns().is_empty());
        map.refusal_rate = Some(REFUSAL_RATE.into());
        map.refusal_level = Some(REFUSAL_LEVEL.into());
        assert_eq!(map.derived_columns(), vec!["refusal_rate", "refusal_level"]);
    }
}
