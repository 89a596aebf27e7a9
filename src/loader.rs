use crate::error::{BedflowError, Result};
use crate::schema::{self, resolve_column, ColumnMap};
use crate::types::{RawTable, Week, WeeklyRecord};
use crate::util::{parse_date_safe, parse_f64_safe};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Accepted names for the weekly fact table, tried in this order.
pub const WEEKLY_FILE_CANDIDATES: &[&str] = &[
    "services_weekly.csv",
    "service_weekly.csv",
    "weekly_services.csv",
    "hospital_beds.csv",
];
pub const STAFF_SCHEDULE_FILE: &str = "staff_schedule.csv";
pub const STAFF_ROSTER_FILE: &str = "staff.csv";
pub const PATIENT_ROSTER_FILE: &str = "patients.csv";

/// Week assumed for the range control when the table has no numeric week.
pub const DEFAULT_MAX_WEEK: f64 = 52.0;

/// Normalized weekly table plus everything loaded alongside it.
///
/// Treated as immutable once built; sessions share it through an `Arc`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<WeeklyRecord>,
    pub columns: ColumnMap,
    pub source: PathBuf,
    pub staff_schedule: Option<Arc<RawTable>>,
    pub staff_roster: Option<Arc<RawTable>>,
    pub patient_roster: Option<Arc<RawTable>>,
}

impl Dataset {
    /// Sorted distinct service identifiers.
    pub fn services(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.records.iter().map(|r| r.service.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Sorted distinct event tags; empty without an event column.
    pub fn events(&self) -> Vec<String> {
        if self.columns.event.is_none() {
            return Vec::new();
        }
        let set: BTreeSet<&str> = self
            .records
            .iter()
            .filter_map(|r| r.event.as_deref())
            .collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Smallest and largest numeric week, if any week is numeric.
    pub fn week_bounds(&self) -> Option<(f64, f64)> {
        self.records
            .iter()
            .filter_map(|r| r.week.as_number())
            .fold(None, |acc, w| match acc {
                None => Some((w, w)),
                Some((lo, hi)) => Some((lo.min(w), hi.max(w))),
            })
    }

    pub fn max_week(&self) -> f64 {
        self.week_bounds().map(|(_, hi)| hi).unwrap_or(DEFAULT_MAX_WEEK)
    }
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub weekly_file: PathBuf,
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub skipped_rows: usize,
    pub missing_optional: Vec<&'static str>,
    pub aux_files: Vec<&'static str>,
}

/// Return the first accepted weekly file that exists under `dir`.
pub fn locate_weekly_file(dir: &Path) -> Result<PathBuf> {
    for name in WEEKLY_FILE_CANDIDATES {
        let p = dir.join(name);
        if p.is_file() {
            return Ok(p);
        }
    }
    let resolved = std::fs::canonicalize(dir).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    });
    Err(BedflowError::DataNotFound {
        path: resolved,
        accepted: WEEKLY_FILE_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    })
}

/// Read a CSV file as headers plus raw string cells.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let csv_err = |source| BedflowError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = rdr.headers().map_err(csv_err)?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(RawTable { name, headers, rows })
}

fn read_optional(dir: &Path, name: &'static str, found: &mut Vec<&'static str>) -> Option<Arc<RawTable>> {
    let path = dir.join(name);
    if !path.is_file() {
        log::debug!("optional file {} not present", name);
        return None;
    }
    match read_table(&path) {
        Ok(table) => {
            log::info!("loaded {} ({} rows)", name, table.len());
            found.push(name);
            Some(Arc::new(table))
        }
        Err(e) => {
            log::warn!("skipping unreadable optional file: {}", e);
            None
        }
    }
}

/// Normalize a week column in one decision for the whole column.
///
/// Numeric when every non-empty cell is a number, ISO dates when every
/// non-empty cell is a date, otherwise the text is kept as-is.
pub fn normalize_weeks(cells: &[&str]) -> Vec<Week> {
    let mut filled = cells.iter().copied().filter(|c| !c.trim().is_empty());
    if filled.all(|c| parse_f64_safe(Some(c)).is_some()) {
        return cells
            .iter()
            .map(|&c| match parse_f64_safe(Some(c)) {
                Some(n) => Week::Number(n),
                None => Week::Label(c.to_string()),
            })
            .collect();
    }
    let mut filled = cells.iter().copied().filter(|c| !c.trim().is_empty());
    if filled.all(|c| parse_date_safe(Some(c)).is_some()) {
        return cells
            .iter()
            .map(|&c| match parse_date_safe(Some(c)) {
                Some(d) => Week::Date(d),
                None => Week::Label(c.to_string()),
            })
            .collect();
    }
    cells.iter().map(|c| Week::Label(c.to_string())).collect()
}

/// Count present staff per `(week, service)` from a schedule table.
///
/// `None` when the schedule lacks a week, service or present column.
pub fn staff_availability(schedule: &RawTable) -> Option<BTreeMap<(Week, String), u32>> {
    let week_col = resolve_column(&schedule.headers, schema::SCHEDULE_WEEK_CANDIDATES)?;
    let service_col = resolve_column(&schedule.headers, schema::SCHEDULE_SERVICE_CANDIDATES)?;
    let present_col = resolve_column(&schedule.headers, schema::SCHEDULE_PRESENT_CANDIDATES)?;
    let wi = schedule.index_of(week_col)?;
    let si = schedule.index_of(service_col)?;
    let pi = schedule.index_of(present_col)?;

    let week_cells: Vec<&str> = (0..schedule.len())
        .map(|r| schedule.cell(r, wi).unwrap_or(""))
        .collect();
    let weeks = normalize_weeks(&week_cells);

    let mut counts: BTreeMap<(Week, String), u32> = BTreeMap::new();
    for (r, week) in weeks.into_iter().enumerate() {
        let service = schedule.cell(r, si).unwrap_or("").to_string();
        let present = parse_f64_safe(schedule.cell(r, pi)).unwrap_or(0.0);
        let e = counts.entry((week, service)).or_insert(0);
        if present == 1.0 {
            *e += 1;
        }
    }
    Some(counts)
}

/// Left-join schedule counts onto the weekly rows; unmatched rows get 0.
///
/// Returns how many rows found a schedule entry.
pub fn join_staff(records: &mut [WeeklyRecord], counts: &BTreeMap<(Week, String), u32>) -> usize {
    let mut matched = 0;
    for rec in records.iter_mut() {
        let key = (rec.week.clone(), rec.service.clone());
        let n = counts.get(&key).copied();
        matched += usize::from(n.is_some());
        rec.available_staff = Some(n.unwrap_or(0));
    }
    matched
}

/// Locate, read and normalize the weekly table plus optional auxiliary files.
///
/// Fails only when no weekly file exists, when it cannot be read, or when
/// `week`/`service` cannot be detected. Unreadable auxiliary files are
/// logged and treated as absent.
pub fn load_dataset(dir: &Path) -> Result<(Dataset, LoadReport)> {
    let weekly_path = locate_weekly_file(dir)?;
    log::info!("using weekly dataset {}", weekly_path.display());
    let table = read_table(&weekly_path)?;

    let schema_err = || BedflowError::Schema {
        file: table.name.clone(),
        columns: table.headers.clone(),
    };
    let week = resolve_column(&table.headers, schema::WEEK_CANDIDATES).ok_or_else(schema_err)?;
    let service =
        resolve_column(&table.headers, schema::SERVICE_CANDIDATES).ok_or_else(schema_err)?;

    let mut columns = ColumnMap::new(week, service);
    let optional = |cands: &[&str]| resolve_column(&table.headers, cands).map(str::to_string);
    columns.requests = optional(schema::REQUESTS_CANDIDATES);
    columns.admissions = optional(schema::ADMISSIONS_CANDIDATES);
    columns.refusals = optional(schema::REFUSALS_CANDIDATES);
    columns.beds = optional(schema::BEDS_CANDIDATES);
    columns.event = optional(schema::EVENT_CANDIDATES);
    columns.morale = optional(schema::MORALE_CANDIDATES);
    columns.satisfaction = optional(schema::SATISFACTION_CANDIDATES);

    let mut missing_optional = Vec::new();
    for (field, col) in [
        ("requests", &columns.requests),
        ("admissions", &columns.admissions),
        ("refusals", &columns.refusals),
        ("beds", &columns.beds),
        ("event", &columns.event),
        ("morale", &columns.morale),
        ("satisfaction", &columns.satisfaction),
    ] {
        match col {
            Some(c) => log::debug!("field '{}' bound to column '{}'", field, c),
            None => {
                log::warn!("optional field '{}' not found in {}", field, table.name);
                missing_optional.push(field);
            }
        }
    }

    let idx = |c: &Option<String>| c.as_deref().and_then(|c| table.index_of(c));
    let wi = table.index_of(&columns.week).ok_or_else(schema_err)?;
    let si = table.index_of(&columns.service).ok_or_else(schema_err)?;
    let (req_i, adm_i, ref_i, bed_i) = (
        idx(&columns.requests),
        idx(&columns.admissions),
        idx(&columns.refusals),
        idx(&columns.beds),
    );
    let (evt_i, mor_i, sat_i) = (idx(&columns.event), idx(&columns.morale), idx(&columns.satisfaction));

    // Rows missing the week or service cell carry no usable key.
    let mut kept: Vec<usize> = Vec::with_capacity(table.len());
    for r in 0..table.len() {
        let has_week = table.cell(r, wi).is_some_and(|c| !c.is_empty());
        let has_service = table.cell(r, si).is_some_and(|c| !c.is_empty());
        if has_week && has_service {
            kept.push(r);
        }
    }
    let week_cells: Vec<&str> = kept.iter().map(|&r| table.cell(r, wi).unwrap_or("")).collect();
    let weeks = normalize_weeks(&week_cells);

    let count = |r: usize, i: Option<usize>| i.map(|i| parse_f64_safe(table.cell(r, i)).unwrap_or(0.0));
    let mut records: Vec<WeeklyRecord> = kept
        .iter()
        .zip(weeks)
        .map(|(&r, week)| {
            let mut rec = WeeklyRecord::new(week, table.cell(r, si).unwrap_or(""));
            rec.requests = count(r, req_i);
            rec.admissions = count(r, adm_i);
            rec.refusals = count(r, ref_i);
            rec.beds = count(r, bed_i);
            rec.event = evt_i
                .and_then(|i| table.cell(r, i))
                .filter(|e| !e.is_empty())
                .map(str::to_string);
            rec.morale = mor_i.and_then(|i| parse_f64_safe(table.cell(r, i)));
            rec.satisfaction = sat_i.and_then(|i| parse_f64_safe(table.cell(r, i)));
            rec
        })
        .collect();

    let mut aux_files = Vec::new();
    let staff_schedule = read_optional(dir, STAFF_SCHEDULE_FILE, &mut aux_files);
    let staff_roster = read_optional(dir, STAFF_ROSTER_FILE, &mut aux_files);
    let patient_roster = read_optional(dir, PATIENT_ROSTER_FILE, &mut aux_files);

    match staff_schedule.as_deref().map(staff_availability) {
        Some(Some(counts)) => {
            let matched = join_staff(&mut records, &counts);
            if matched == 0 && !counts.is_empty() {
                log::warn!(
                    "no (week, service) key in {} matches the weekly table; check that both week columns use the same format",
                    STAFF_SCHEDULE_FILE
                );
            }
            columns.staff = Some(schema::AVAILABLE_STAFF.to_string());
        }
        Some(None) => {
            log::warn!("{} lacks week/service/present columns; staff availability not derived", STAFF_SCHEDULE_FILE);
        }
        None => {}
    }

    let report = LoadReport {
        weekly_file: weekly_path.clone(),
        total_rows: table.len(),
        loaded_rows: records.len(),
        skipped_rows: table.len() - records.len(),
        missing_optional,
        aux_files,
    };
    log::info!(
        "loaded {} of {} weekly rows from {}",
        report.loaded_rows,
        report.total_rows,
        table.name
    );

    let dataset = Dataset {
        records,
        columns,
        source: weekly_path,
        staff_schedule,
        staff_roster,
        patient_roster,
    };
    Ok((dataset, report))
}
