use crate::loader::Dataset;
use crate::types::{RefusalLevel, ServiceSummaryRow, SummaryStats};
use crate::util::{average, format_number, format_pct, safe_ratio};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Per-service totals for the CLI preview, worst refusal rate first.
pub fn service_summary(data: &Dataset) -> Vec<ServiceSummaryRow> {
    #[derive(Default)]
    struct Acc {
        weeks: usize,
        requests: f64,
        admissions: f64,
        refusals: f64,
        rates: Vec<f64>,
        utilization: Vec<f64>,
        worst: Option<RefusalLevel>,
    }

    let mut map: HashMap<&str, Acc> = HashMap::new();
    for r in &data.records {
        let e = map.entry(r.service.as_str()).or_default();
        e.weeks += 1;
        e.requests += r.requests.unwrap_or(0.0);
        e.admissions += r.admissions.unwrap_or(0.0);
        e.refusals += r.refusals.unwrap_or(0.0);
        e.rates.extend(r.refusal_rate);
        e.utilization.extend(r.bed_utilization);
        e.worst = e.worst.max(r.refusal_level);
    }

    let cols = &data.columns;
    let count = |present: bool, v: f64| {
        if present {
            format_number(v, 0)
        } else {
            "-".to_string()
        }
    };
    let mut rows: Vec<(f64, ServiceSummaryRow)> = map
        .into_iter()
        .map(|(service, acc)| {
            let avg_rate = average(&acc.rates);
            let row = ServiceSummaryRow {
                service: service.to_string(),
                weeks: acc.weeks,
                requests: count(cols.requests.is_some(), acc.requests),
                admissions: count(cols.admissions.is_some(), acc.admissions),
                refusals: count(cols.refusals.is_some(), acc.refusals),
                avg_refusal_rate: if cols.refusal_rate.is_some() { format_pct(avg_rate) } else { "-".into() },
                avg_bed_utilization: if cols.bed_utilization.is_some() {
                    format_pct(average(&acc.utilization))
                } else {
                    "-".into()
                },
                worst_refusal_level: acc.worst.map(|l| l.label().to_string()).unwrap_or_else(|| "-".into()),
            };
            (avg_rate, row)
        })
        .collect();

    rows.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.service.cmp(&b.1.service))
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

pub fn generate_summary(data: &Dataset) -> SummaryStats {
    let total_requests: f64 = data.records.iter().filter_map(|r| r.requests).sum();
    let total_refusals: f64 = data.records.iter().filter_map(|r| r.refusals).sum();
    SummaryStats {
        total_rows: data.records.len(),
        total_services: data.services().len(),
        total_events: data.events().len(),
        max_week: data.max_week(),
        total_requests,
        total_refusals,
        global_refusal_rate: safe_ratio(total_refusals, total_requests),
        derived_columns: data.columns.derived_columns(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::derive_metrics;
    use crate::schema::ColumnMap;
    use crate::types::{Week, WeeklyRecord};
    use std::path::PathBuf;

    fn rec(week: f64, service: &str, requests: f64, refusals: f64) -> WeeklyRecord {
        let mut r = WeeklyRecord::new(Week::Number(week), service);
        r.requests = Some(requests);
        r.refusals = Some(refusals);
        r
    }

    fn dataset() -> Dataset {
        let mut columns = ColumnMap::new("week", "service");
        columns.requests = Some("patients_request".into());
        columns.refusals = Some("patients_refused".into());
        let raw = Dataset {
            records: vec![
                rec(1.0, "ICU", 10.0, 2.0),
                rec(2.0, "ICU", 10.0, 5.0),
                rec(1.0, "ER", 20.0, 0.0),
            ],
            columns,
            source: PathBuf::from("services_weekly.csv"),
            staff_schedule: None,
            staff_roster: None,
            patient_roster: None,
        };
        derive_metrics(&raw)
    }

    #[test]
    fn summary_rows_rank_by_refusal_rate() {
        let rows = service_summary(&dataset());
        assert_eq!(rows[0].service, "ICU");
        assert_eq!(rows[0].weeks, 2);
        assert_eq!(rows[0].requests, "20");
        assert_eq!(rows[0].avg_refusal_rate, "35.0%");
        assert_eq!(rows[0].worst_refusal_level, "Critical");
        assert_eq!(rows[0].admissions, "-");
        assert_eq!(rows[1].worst_refusal_level, "Low");
    }

    #[test]
    fn global_summary() {
        let s = generate_summary(&dataset());
        assert_eq!(s.total_rows, 3);
        assert_eq!(s.total_services, 2);
        assert_eq!(s.total_events, 0);
        assert_eq!(s.max_week, 2.0);
        assert!((s.global_refusal_rate - 7.0 / 40.0).abs() < 1e-12);
        assert_eq!(s.derived_columns, vec!["refusal_rate", "demand_level", "refusal_level"]);
    }
}
