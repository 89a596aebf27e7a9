use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tabled::Tabled;

/// A CSV file read verbatim: header row plus string cells.
///
/// Column detection runs against `headers`; typed normalization happens
/// afterwards in the loader.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn index_of(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell text, or `None` for short (ragged) rows.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Temporal key of a weekly row.
///
/// The loader decides the variant once per column: numeric when every
/// non-empty cell parses as a number, ISO dates when every cell parses as
/// `YYYY-MM-DD`, free text otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Week {
    Number(f64),
    Date(NaiveDate),
    Label(String),
}

impl Week {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Week::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Week::Number(_) => 0,
            Week::Date(_) => 1,
            Week::Label(_) => 2,
        }
    }
}

impl PartialEq for Week {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Week {}

impl PartialOrd for Week {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Week {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Week::Number(a), Week::Number(b)) => a.total_cmp(b),
            (Week::Date(a), Week::Date(b)) => a.cmp(b),
            (Week::Label(a), Week::Label(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Week::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Week::Number(n) => write!(f, "{}", n),
            Week::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Week::Label(s) => f.write_str(s),
        }
    }
}

/// Ordered demand buckets, relative to the loaded dataset's distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DemandLevel {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl DemandLevel {
    pub fn label(self) -> &'static str {
        match self {
            DemandLevel::Low => "Low",
            DemandLevel::Medium => "Medium",
            DemandLevel::High => "High",
            DemandLevel::VeryHigh => "Very High",
        }
    }
}

/// Ordered refusal buckets on fixed absolute thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefusalLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RefusalLevel {
    pub fn label(self) -> &'static str {
        match self {
            RefusalLevel::Low => "Low",
            RefusalLevel::Medium => "Medium",
            RefusalLevel::High => "High",
            RefusalLevel::Critical => "Critical",
        }
    }
}

/// One service × week row of the normalized fact table.
///
/// Optional source fields are `None` on every row when the column map has
/// no entry for them; derived fields stay `None` until the metric deriver
/// runs and its prerequisites exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyRecord {
    pub week: Week,
    pub service: String,
    pub requests: Option<f64>,
    pub admissions: Option<f64>,
    pub refusals: Option<f64>,
    pub beds: Option<f64>,
    pub available_staff: Option<u32>,
    pub event: Option<String>,
    pub morale: Option<f64>,
    pub satisfaction: Option<f64>,
    pub refusal_rate: Option<f64>,
    pub bed_utilization: Option<f64>,
    pub patients_per_staff: Option<f64>,
    pub demand_level: Option<DemandLevel>,
    pub refusal_level: Option<RefusalLevel>,
}

impl WeeklyRecord {
    pub fn new(week: Week, service: impl Into<String>) -> Self {
        Self {
            week,
            service: service.into(),
            requests: None,
            admissions: None,
            refusals: None,
            beds: None,
            available_staff: None,
            event: None,
            morale: None,
            satisfaction: None,
            refusal_rate: None,
            bed_utilization: None,
            patients_per_staff: None,
            demand_level: None,
            refusal_level: None,
        }
    }
}

/// Flat export row for `weekly_derived.csv`.
#[derive(Debug, Serialize)]
pub struct DerivedExportRow {
    pub week: String,
    pub service: String,
    pub requests: Option<f64>,
    pub admissions: Option<f64>,
    pub refusals: Option<f64>,
    pub beds: Option<f64>,
    pub available_staff: Option<u32>,
    pub event: Option<String>,
    pub refusal_rate: Option<f64>,
    pub bed_utilization: Option<f64>,
    pub patients_per_staff: Option<f64>,
    pub demand_level: Option<&'static str>,
    pub refusal_level: Option<&'static str>,
}

impl From<&WeeklyRecord> for DerivedExportRow {
    fn from(r: &WeeklyRecord) -> Self {
        Self {
            week: r.week.to_string(),
            service: r.service.clone(),
            requests: r.requests,
            admissions: r.admissions,
            refusals: r.refusals,
            beds: r.beds,
            available_staff: r.available_staff,
            event: r.event.clone(),
            refusal_rate: r.refusal_rate,
            bed_utilization: r.bed_utilization,
            patients_per_staff: r.patients_per_staff,
            demand_level: r.demand_level.map(DemandLevel::label),
            refusal_level: r.refusal_level.map(RefusalLevel::label),
        }
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ServiceSummaryRow {
    #[serde(rename = "Service")]
    #[tabled(rename = "Service")]
    pub service: String,
    #[serde(rename = "Weeks")]
    #[tabled(rename = "Weeks")]
    pub weeks: usize,
    #[serde(rename = "Requests")]
    #[tabled(rename = "Requests")]
    pub requests: String,
    #[serde(rename = "Admissions")]
    #[tabled(rename = "Admissions")]
    pub admissions: String,
    #[serde(rename = "Refusals")]
    #[tabled(rename = "Refusals")]
    pub refusals: String,
    #[serde(rename = "AvgRefusalRate")]
    #[tabled(rename = "AvgRefusalRate")]
    pub avg_refusal_rate: String,
    #[serde(rename = "AvgBedUtilization")]
    #[tabled(rename = "AvgBedUtilization")]
    pub avg_bed_utilization: String,
    #[serde(rename = "WorstRefusalLevel")]
    #[tabled(rename = "WorstRefusalLevel")]
    pub worst_refusal_level: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total_rows: usize,
    pub total_services: usize,
    pub total_events: usize,
    pub max_week: f64,
    pub total_requests: f64,
    pub total_refusals: f64,
    pub global_refusal_rate: f64,
    pub derived_columns: Vec<String>,
}
