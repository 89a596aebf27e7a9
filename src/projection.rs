//! Read-only projections of the weekly table for each view.
//!
//! Filtering order is fixed: the external week-range control first, then the
//! session's service filter, then (for the diagnostic and impact views) the
//! drill-down window. Nothing here mutates the dataset or the state.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::loader::Dataset;
use crate::metrics::{inline_bed_utilization, inline_patients_per_staff, inline_refusal_rate};
use crate::schema::ColumnMap;
use crate::state::{DiagnosticFocus, InteractionState};
use crate::types::{Week, WeeklyRecord};
use crate::util::average;

/// Inclusive `[lo, hi]` week interval.
pub type WeekRange = [f64; 2];

/// Event categories in their display order; other categories follow alphabetically.
pub const EVENT_ORDER: &[&str] = &["flu", "strike", "donation"];

/// Where a metric's values come from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricSource {
    /// The derived column is bound in the column map.
    Derived,
    /// The derived column is absent but its inputs exist; recompute per row.
    Inline,
    /// Neither is available; the series is all zeros.
    Zero,
}

pub fn metric_source(columns: &ColumnMap, metric: DiagnosticFocus) -> MetricSource {
    let (derived, inputs) = match metric {
        DiagnosticFocus::RefusalRate => (
            columns.refusal_rate.is_some(),
            columns.requests.is_some() && columns.refusals.is_some(),
        ),
        DiagnosticFocus::BedUtilization => (
            columns.bed_utilization.is_some(),
            columns.admissions.is_some() && columns.beds.is_some(),
        ),
        DiagnosticFocus::PatientsPerStaff => (
            columns.patients_per_staff.is_some(),
            columns.admissions.is_some() && columns.staff.is_some(),
        ),
    };
    if derived {
        MetricSource::Derived
    } else if inputs {
        MetricSource::Inline
    } else {
        MetricSource::Zero
    }
}

/// One value per row for `metric`; never fails, never yields NaN.
pub fn metric_series(rows: &[&WeeklyRecord], columns: &ColumnMap, metric: DiagnosticFocus) -> Vec<f64> {
    let source = metric_source(columns, metric);
    rows.iter()
        .map(|r| {
            let v = match (source, metric) {
                (MetricSource::Zero, _) => None,
                (MetricSource::Derived, DiagnosticFocus::RefusalRate) => r.refusal_rate,
                (MetricSource::Derived, DiagnosticFocus::BedUtilization) => r.bed_utilization,
                (MetricSource::Derived, DiagnosticFocus::PatientsPerStaff) => r.patients_per_staff,
                (MetricSource::Inline, DiagnosticFocus::RefusalRate) => inline_refusal_rate(r),
                (MetricSource::Inline, DiagnosticFocus::BedUtilization) => inline_bed_utilization(r),
                (MetricSource::Inline, DiagnosticFocus::PatientsPerStaff) => inline_patients_per_staff(r),
            };
            v.filter(|x| x.is_finite()).unwrap_or(0.0)
        })
        .collect()
}

fn in_range(week: &Week, range: WeekRange) -> bool {
    // Non-numeric weeks are not subject to numeric ranges.
    week.as_number().map_or(true, |w| w >= range[0] && w <= range[1])
}

/// Rows left after the week-range control and the service filter.
pub fn filter_rows<'a>(
    dataset: &'a Dataset,
    state: &InteractionState,
    week_range: Option<WeekRange>,
) -> Vec<&'a WeeklyRecord> {
    dataset
        .records
        .iter()
        .filter(|r| week_range.map_or(true, |range| in_range(&r.week, range)))
        .filter(|r| state.filtered_service().map_or(true, |s| r.service == s))
        .collect()
}

/// Week interval shown around a drill-down week, clamped at week 1.
pub fn drilldown_window(selected_week: i64, half_window: u32) -> WeekRange {
    let w = selected_week as f64;
    let half = f64::from(half_window);
    [(w - half).max(1.0), w + half]
}

/// Narrow rows to the selected service and its window; identity without a selection.
pub fn drilldown_rows<'a>(
    rows: &[&'a WeeklyRecord],
    state: &InteractionState,
    half_window: u32,
) -> Vec<&'a WeeklyRecord> {
    let Some(d) = state.drilldown() else {
        return rows.to_vec();
    };
    let window = drilldown_window(d.week, half_window);
    rows.iter()
        .copied()
        .filter(|r| r.service == d.service && in_range(&r.week, window))
        .collect()
}

/// Per-week totals and means after all filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekAggregate {
    pub week: Week,
    pub rows: usize,
    pub requests: Option<f64>,
    pub admissions: Option<f64>,
    pub refusals: Option<f64>,
    pub beds: Option<f64>,
    pub available_staff: Option<f64>,
    pub refusal_rate: Option<f64>,
    pub bed_utilization: Option<f64>,
    pub patients_per_staff: Option<f64>,
    /// Inside the active brush range.
    pub highlighted: bool,
}

/// Group rows by week: flow counts are summed, everything else averaged.
pub fn aggregate_by_week(
    rows: &[&WeeklyRecord],
    columns: &ColumnMap,
    brush: Option<WeekRange>,
) -> Vec<WeekAggregate> {
    let mut groups: BTreeMap<&Week, Vec<&WeeklyRecord>> = BTreeMap::new();
    for &r in rows {
        groups.entry(&r.week).or_default().push(r);
    }

    fn sum(rs: &[&WeeklyRecord], present: bool, f: impl Fn(&WeeklyRecord) -> Option<f64>) -> Option<f64> {
        present.then(|| rs.iter().filter_map(|&r| f(r)).sum())
    }
    fn mean(rs: &[&WeeklyRecord], present: bool, f: impl Fn(&WeeklyRecord) -> Option<f64>) -> Option<f64> {
        present.then(|| average(&rs.iter().filter_map(|&r| f(r)).collect::<Vec<_>>()))
    }

    groups
        .into_iter()
        .map(|(week, rs)| WeekAggregate {
            week: week.clone(),
            rows: rs.len(),
            requests: sum(&rs, columns.requests.is_some(), |r| r.requests),
            admissions: sum(&rs, columns.admissions.is_some(), |r| r.admissions),
            refusals: sum(&rs, columns.refusals.is_some(), |r| r.refusals),
            beds: mean(&rs, columns.beds.is_some(), |r| r.beds),
            available_staff: mean(&rs, columns.staff.is_some(), |r| r.available_staff.map(f64::from)),
            refusal_rate: mean(&rs, columns.refusal_rate.is_some(), |r| r.refusal_rate),
            bed_utilization: mean(&rs, columns.bed_utilization.is_some(), |r| r.bed_utilization),
            patients_per_staff: mean(&rs, columns.patients_per_staff.is_some(), |r| r.patients_per_staff),
            highlighted: brush.is_some_and(|b| week.as_number().is_some_and(|w| w >= b[0] && w <= b[1])),
        })
        .collect()
}

/// Service × week matrix for the locator view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapGrid {
    pub title: String,
    pub metric: DiagnosticFocus,
    /// Ordered by descending row mean.
    pub services: Vec<String>,
    pub weeks: Vec<Week>,
    /// `values[service][week]`, zero where no row exists.
    pub values: Vec<Vec<f64>>,
    /// `(service_idx, week_idx)` of the drill-down cell when it is on the grid.
    pub selected: Option<(usize, usize)>,
}

pub fn heatmap(
    rows: &[&WeeklyRecord],
    columns: &ColumnMap,
    state: &InteractionState,
) -> HeatmapGrid {
    let metric = state.diagnostic_focus();
    let values = metric_series(rows, columns, metric);

    let mut cells: BTreeMap<(&str, &Week), Vec<f64>> = BTreeMap::new();
    let mut weeks: Vec<Week> = Vec::new();
    for (r, v) in rows.iter().zip(values) {
        cells.entry((r.service.as_str(), &r.week)).or_default().push(v);
        weeks.push(r.week.clone());
    }
    weeks.sort();
    weeks.dedup();

    let mut by_service: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for ((service, week), vs) in &cells {
        let row = by_service
            .entry(*service)
            .or_insert_with(|| vec![0.0; weeks.len()]);
        if let Ok(i) = weeks.binary_search(*week) {
            row[i] = average(vs);
        }
    }

    let mut ordered: Vec<(&str, Vec<f64>)> = by_service.into_iter().collect();
    // stable sort keeps alphabetical order among equal means
    ordered.sort_by(|a, b| {
        average(&b.1)
            .partial_cmp(&average(&a.1))
            .unwrap_or(Ordering::Equal)
    });

    let services: Vec<String> = ordered.iter().map(|(s, _)| s.to_string()).collect();
    let selected = state.drilldown().and_then(|d| {
        let si = services.iter().position(|s| *s == d.service)?;
        let wi = weeks.iter().position(|w| *w == Week::Number(d.week as f64))?;
        Some((si, wi))
    });

    HeatmapGrid {
        title: format!("{} by Service × Week", metric.label()),
        metric,
        services,
        weeks,
        values: ordered.into_iter().map(|(_, v)| v).collect(),
        selected,
    }
}

/// A run of consecutive weeks on which an event category occurs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventBand {
    pub event: String,
    pub start: f64,
    pub end: f64,
    /// A brush is active and the band lies entirely outside it.
    pub dimmed: bool,
}

pub fn event_bands(
    rows: &[&WeeklyRecord],
    columns: &ColumnMap,
    state: &InteractionState,
) -> Vec<EventBand> {
    if columns.event.is_none() {
        return Vec::new();
    }
    let mut weeks_by_event: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for &r in rows {
        if let (Some(e), Some(w)) = (r.event.as_deref(), r.week.as_number()) {
            weeks_by_event.entry(e).or_default().push(w);
        }
    }

    let mut order: Vec<&str> = EVENT_ORDER
        .iter()
        .copied()
        .filter(|e| weeks_by_event.contains_key(e))
        .collect();
    order.extend(weeks_by_event.keys().copied().filter(|e| !EVENT_ORDER.contains(e)));

    let brush = state.brush_range();
    let mut bands = Vec::new();
    for event in order {
        if !state.visible_events().contains(event) {
            continue;
        }
        let mut weeks = weeks_by_event[event].clone();
        weeks.sort_by(|a, b| a.total_cmp(b));
        weeks.dedup();

        let mut i = 0;
        while i < weeks.len() {
            let start = weeks[i];
            while i + 1 < weeks.len() && weeks[i + 1] == weeks[i] + 1.0 {
                i += 1;
            }
            let end = weeks[i];
            let dimmed = brush.is_some_and(|b| end < b[0] || start > b[1]);
            bands.push(EventBand { event: event.to_string(), start, end, dimmed });
            i += 1;
        }
    }
    bands
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactPoint {
    pub week: Week,
    pub morale: Option<f64>,
    pub satisfaction: Option<f64>,
    pub highlighted: bool,
}

/// Weekly mean morale and satisfaction; empty when neither column exists.
pub fn impact_series(
    rows: &[&WeeklyRecord],
    columns: &ColumnMap,
    brush: Option<WeekRange>,
) -> Vec<ImpactPoint> {
    if columns.morale.is_none() && columns.satisfaction.is_none() {
        return Vec::new();
    }
    let mut groups: BTreeMap<&Week, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for &r in rows {
        let g = groups.entry(&r.week).or_default();
        g.0.extend(r.morale);
        g.1.extend(r.satisfaction);
    }
    groups
        .into_iter()
        .map(|(week, (m, s))| ImpactPoint {
            week: week.clone(),
            morale: columns.morale.as_ref().map(|_| average(&m)),
            satisfaction: columns.satisfaction.as_ref().map(|_| average(&s)),
            highlighted: brush.is_some_and(|b| week.as_number().is_some_and(|w| w >= b[0] && w <= b[1])),
        })
        .collect()
}

/// Which view sections the layout shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewVisibility {
    pub diagnostic: bool,
    pub impact: bool,
    pub placeholder: bool,
}

pub fn view_visibility(state: &InteractionState) -> ViewVisibility {
    let selected = state.has_selection();
    ViewVisibility {
        diagnostic: selected,
        impact: selected,
        placeholder: !selected,
    }
}

/// `"general_medicine"` → `"General Medicine"`.
pub fn display_service(service: &str) -> String {
    service
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticView {
    pub service_label: String,
    pub focus: DiagnosticFocus,
    pub window: Option<WeekRange>,
    pub weeks: Vec<WeekAggregate>,
    pub events: Vec<EventBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactView {
    pub window: Option<WeekRange>,
    pub points: Vec<ImpactPoint>,
}

/// Binds a dataset snapshot and window size for one round of view updates.
pub struct Projector<'a> {
    dataset: &'a Dataset,
    half_window: u32,
}

impl<'a> Projector<'a> {
    pub fn new(dataset: &'a Dataset, half_window: u32) -> Self {
        Self { dataset, half_window }
    }

    pub fn heatmap(&self, state: &InteractionState, week_range: Option<WeekRange>) -> HeatmapGrid {
        let rows = filter_rows(self.dataset, state, week_range);
        heatmap(&rows, &self.dataset.columns, state)
    }

    pub fn diagnostic(&self, state: &InteractionState, week_range: Option<WeekRange>) -> DiagnosticView {
        let rows = filter_rows(self.dataset, state, week_range);
        let rows = drilldown_rows(&rows, state, self.half_window);
        let columns = &self.dataset.columns;
        DiagnosticView {
            service_label: state
                .selected_service()
                .map(display_service)
                .unwrap_or_else(|| "All Services".to_string()),
            focus: state.diagnostic_focus(),
            window: state.selected_week().map(|w| drilldown_window(w, self.half_window)),
            weeks: aggregate_by_week(&rows, columns, state.brush_range()),
            events: event_bands(&rows, columns, state),
        }
    }

    pub fn impact(&self, state: &InteractionState, week_range: Option<WeekRange>) -> ImpactView {
        let rows = filter_rows(self.dataset, state, week_range);
        let rows = drilldown_rows(&rows, state, self.half_window);
        ImpactView {
            window: state.selected_week().map(|w| drilldown_window(w, self.half_window)),
            points: impact_series(&rows, &self.dataset.columns, state.brush_range()),
        }
    }

    /// Focus metric for the filtered rows, one value per row.
    pub fn focus_series(&self, state: &InteractionState, week_range: Option<WeekRange>) -> Vec<f64> {
        let rows = filter_rows(self.dataset, state, week_range);
        metric_series(&rows, &self.dataset.columns, state.diagnostic_focus())
    }
}
