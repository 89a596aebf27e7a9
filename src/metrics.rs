//! Derived metrics over the normalized weekly table.
//!
//! `derive_metrics` never touches its input: it returns a new dataset with
//! the derived fields filled and the column map extended. Each metric is
//! skipped on its own when a prerequisite column is absent.

use crate::loader::Dataset;
use crate::schema;
use crate::types::{DemandLevel, RefusalLevel, WeeklyRecord};
use crate::util::{median, quantile, safe_ratio};

/// Fixed refusal-rate edges: (-0.01, 0.05], (0.05, 0.15], (0.15, 0.30], (0.30, 1.01].
pub const REFUSAL_LEVEL_EDGES: [f64; 5] = [-0.01, 0.05, 0.15, 0.30, 1.01];

/// Demand edges computed once from the full table's `requests` distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandBins {
    pub edges: [f64; 5],
}

impl DemandBins {
    /// Edges `[-1, median * 0.5, median, p75, +inf)`.
    ///
    /// With a zero median the first two edges coincide; that is kept as is.
    pub fn from_requests(values: &[f64]) -> Self {
        let med = median(values.to_vec());
        let p75 = quantile(values.to_vec(), 0.75);
        Self {
            edges: [-1.0, med * 0.5, med, p75, f64::INFINITY],
        }
    }

    pub fn classify(&self, requests: f64) -> Option<DemandLevel> {
        const LABELS: [DemandLevel; 4] = [
            DemandLevel::Low,
            DemandLevel::Medium,
            DemandLevel::High,
            DemandLevel::VeryHigh,
        ];
        bin_right_closed(&self.edges, requests).map(|i| LABELS[i])
    }
}

pub fn refusal_level(rate: f64) -> Option<RefusalLevel> {
    const LABELS: [RefusalLevel; 4] = [
        RefusalLevel::Low,
        RefusalLevel::Medium,
        RefusalLevel::High,
        RefusalLevel::Critical,
    ];
    bin_right_closed(&REFUSAL_LEVEL_EDGES, rate).map(|i| LABELS[i])
}

/// Index of the right-closed interval `(edges[i], edges[i + 1]]` holding `v`.
///
/// Edges are scanned left to right, so with coinciding edges the earlier
/// bucket takes the value and the later one stays empty.
fn bin_right_closed(edges: &[f64], v: f64) -> Option<usize> {
    if v.is_nan() || v <= edges[0] {
        return None;
    }
    edges.windows(2).position(|w| v > w[0] && v <= w[1])
}

/// Compute every derivable metric and return the extended dataset.
pub fn derive_metrics(dataset: &Dataset) -> Dataset {
    let mut out = dataset.clone();
    let cols = &mut out.columns;
    let records = &mut out.records;

    if cols.requests.is_some() && cols.refusals.is_some() {
        for r in records.iter_mut() {
            r.refusal_rate = Some(safe_ratio(
                r.refusals.unwrap_or(0.0),
                r.requests.unwrap_or(0.0),
            ));
        }
        cols.refusal_rate = Some(schema::REFUSAL_RATE.to_string());
    } else {
        log::debug!("refusal_rate skipped: requests or refusals column absent");
    }

    if cols.admissions.is_some() && cols.beds.is_some() {
        for r in records.iter_mut() {
            r.bed_utilization = Some(safe_ratio(
                r.admissions.unwrap_or(0.0),
                r.beds.unwrap_or(0.0),
            ));
        }
        cols.bed_utilization = Some(schema::BED_UTILIZATION.to_string());
    } else {
        log::debug!("bed_utilization skipped: admissions or beds column absent");
    }

    if cols.admissions.is_some() && cols.staff.is_some() {
        for r in records.iter_mut() {
            r.patients_per_staff = Some(safe_ratio(
                r.admissions.unwrap_or(0.0),
                f64::from(r.available_staff.unwrap_or(0)),
            ));
        }
        cols.patients_per_staff = Some(schema::PATIENTS_PER_STAFF.to_string());
    } else {
        log::debug!("patients_per_staff skipped: admissions or staff availability absent");
    }

    if cols.requests.is_some() {
        let values: Vec<f64> = records.iter().filter_map(|r| r.requests).collect();
        let bins = DemandBins::from_requests(&values);
        log::debug!("demand_level edges {:?}", bins.edges);
        for r in records.iter_mut() {
            r.demand_level = r.requests.and_then(|v| bins.classify(v));
        }
        cols.demand_level = Some(schema::DEMAND_LEVEL.to_string());
    } else {
        log::debug!("demand_level skipped: requests column absent");
    }

    if cols.refusal_rate.is_some() {
        for r in records.iter_mut() {
            r.refusal_level = r.refusal_rate.and_then(refusal_level);
        }
        cols.refusal_level = Some(schema::REFUSAL_LEVEL.to_string());
    }

    log::info!("derived columns: {:?}", out.columns.derived_columns());
    out
}

/// Refusal rate recomputed inline for a single row.
pub fn inline_refusal_rate(r: &WeeklyRecord) -> Option<f64> {
    Some(safe_ratio(r.refusals?, r.requests?))
}

pub fn inline_bed_utilization(r: &WeeklyRecord) -> Option<f64> {
    Some(safe_ratio(r.admissions?, r.beds?))
}

pub fn inline_patients_per_staff(r: &WeeklyRecord) -> Option<f64> {
    Some(safe_ratio(r.admissions?, f64::from(r.available_staff?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMap;
    use crate::types::Week;
    use std::path::PathBuf;

    fn dataset(records: Vec<WeeklyRecord>, columns: ColumnMap) -> Dataset {
        Dataset {
            records,
            columns,
            source: PathBuf::from("services_weekly.csv"),
            staff_schedule: None,
            staff_roster: None,
            patient_roster: None,
        }
    }

    fn row(week: f64, requests: f64, refusals: f64) -> WeeklyRecord {
        let mut r = WeeklyRecord::new(Week::Number(week), "ICU");
        r.requests = Some(requests);
        r.refusals = Some(refusals);
        r
    }

    fn flow_columns() -> ColumnMap {
        let mut c = ColumnMap::new("week", "service");
        c.requests = Some("patients_request".into());
        c.refusals = Some("patients_refused".into());
        c
    }

    #[test]
    fn refusal_rate_per_row() {
        let ds = dataset(vec![row(1.0, 10.0, 2.0), row(2.0, 10.0, 5.0)], flow_columns());
        let out = derive_metrics(&ds);
        let rates: Vec<f64> = out.records.iter().map(|r| r.refusal_rate.unwrap()).collect();
        assert_eq!(rates, vec![0.2, 0.5]);
        assert_eq!(out.columns.refusal_rate.as_deref(), Some("refusal_rate"));
    }

    #[test]
    fn zero_requests_gives_zero_rate() {
        let ds = dataset(vec![row(1.0, 0.0, 0.0)], flow_columns());
        let out = derive_metrics(&ds);
        assert_eq!(out.records[0].refusal_rate, Some(0.0));
        assert_eq!(out.records[0].refusal_level, Some(RefusalLevel::Low));
    }

    #[test]
    fn zero_beds_gives_zero_utilization() {
        let mut r = WeeklyRecord::new(Week::Number(1.0), "ER");
        r.admissions = Some(5.0);
        r.beds = Some(0.0);
        let mut cols = ColumnMap::new("week", "service");
        cols.admissions = Some("patients_admitted".into());
        cols.beds = Some("available_beds".into());
        let out = derive_metrics(&dataset(vec![r], cols));
        assert_eq!(out.records[0].bed_utilization, Some(0.0));
    }

    #[test]
    fn input_dataset_is_left_untouched() {
        let ds = dataset(vec![row(1.0, 10.0, 2.0)], flow_columns());
        let _ = derive_metrics(&ds);
        assert_eq!(ds.records[0].refusal_rate, None);
        assert_eq!(ds.columns.refusal_rate, None);
    }

    #[test]
    fn missing_staff_skips_only_patients_per_staff() {
        let mut cols = flow_columns();
        cols.admissions = Some("patients_admitted".into());
        let mut r = row(1.0, 10.0, 1.0);
        r.admissions = Some(9.0);
        let out = derive_metrics(&dataset(vec![r], cols));
        assert!(out.columns.patients_per_staff.is_none());
        assert!(out.records[0].patients_per_staff.is_none());
        assert!(out.columns.refusal_rate.is_some());
        assert!(out.columns.demand_level.is_some());
        assert!(out.columns.bed_utilization.is_none());
    }

    #[test]
    fn patients_per_staff_zero_staff_is_zero() {
        let mut cols = ColumnMap::new("week", "service");
        cols.admissions = Some("patients_admitted".into());
        cols.staff = Some(schema::AVAILABLE_STAFF.into());
        let mut a = WeeklyRecord::new(Week::Number(1.0), "ICU");
        a.admissions = Some(12.0);
        a.available_staff = Some(4);
        let mut b = WeeklyRecord::new(Week::Number(2.0), "ICU");
        b.admissions = Some(12.0);
        b.available_staff = Some(0);
        let out = derive_metrics(&dataset(vec![a, b], cols));
        assert_eq!(out.records[0].patients_per_staff, Some(3.0));
        assert_eq!(out.records[1].patients_per_staff, Some(0.0));
    }

    #[test]
    fn refusal_level_thresholds_are_fixed() {
        assert_eq!(refusal_level(0.0), Some(RefusalLevel::Low));
        assert_eq!(refusal_level(0.05), Some(RefusalLevel::Low));
        assert_eq!(refusal_level(0.06), Some(RefusalLevel::Medium));
        assert_eq!(refusal_level(0.15), Some(RefusalLevel::Medium));
        assert_eq!(refusal_level(0.2), Some(RefusalLevel::High));
        assert_eq!(refusal_level(0.31), Some(RefusalLevel::Critical));
        assert_eq!(refusal_level(1.0), Some(RefusalLevel::Critical));
    }

    #[test]
    fn demand_bins_follow_distribution() {
        // median 20, p75 30
        let bins = DemandBins::from_requests(&[10.0, 20.0, 20.0, 30.0, 40.0]);
        assert_eq!(bins.edges[1], 10.0);
        assert_eq!(bins.edges[2], 20.0);
        assert_eq!(bins.edges[3], 30.0);
        assert_eq!(bins.classify(0.0), Some(DemandLevel::Low));
        assert_eq!(bins.classify(10.0), Some(DemandLevel::Low));
        assert_eq!(bins.classify(15.0), Some(DemandLevel::Medium));
        assert_eq!(bins.classify(25.0), Some(DemandLevel::High));
        assert_eq!(bins.classify(31.0), Some(DemandLevel::VeryHigh));
        assert_eq!(bins.classify(1e9), Some(DemandLevel::VeryHigh));
    }

    #[test]
    fn demand_level_is_monotonic_in_requests() {
        let bins = DemandBins::from_requests(&[3.0, 8.0, 12.0, 12.0, 19.0, 40.0, 41.0]);
        let mut prev = bins.classify(0.0);
        for step in 1..500 {
            let cur = bins.classify(step as f64 * 0.1);
            assert!(cur >= prev, "level dropped at {}", step as f64 * 0.1);
            prev = cur;
        }
    }

    #[test]
    fn zero_median_keeps_degenerate_bins() {
        let bins = DemandBins::from_requests(&[0.0, 0.0, 0.0, 4.0]);
        assert_eq!(bins.edges[1], 0.0);
        assert_eq!(bins.edges[2], 0.0);
        assert_eq!(bins.classify(0.0), Some(DemandLevel::Low));
        assert_eq!(bins.classify(0.5), Some(DemandLevel::High));
    }
}
