//! Shared dataset handle and per-session state holder.
//!
//! The dataset is loaded once and shared read-only through an `Arc`. A
//! reload builds a complete new dataset and swaps the reference in one step,
//! so readers see either the old table or the new one, never a mix. Each
//! session owns its own `InteractionState`.

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::DashboardConfig;
use crate::error::Result;
use crate::loader::{load_dataset, Dataset, LoadReport};
use crate::metrics::derive_metrics;
use crate::projection::{Projector, WeekRange};
use crate::state::{apply_cycle, transition, InteractionState, Trigger};

/// Load the weekly table from `config.data_dir` and attach derived metrics.
pub fn load_and_derive(config: &DashboardConfig) -> Result<(Dataset, LoadReport)> {
    let (raw, report) = load_dataset(&config.data_dir)?;
    Ok((derive_metrics(&raw), report))
}

#[derive(Debug)]
pub struct DatasetStore {
    current: RwLock<Arc<Dataset>>,
}

impl DatasetStore {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            current: RwLock::new(Arc::new(dataset)),
        }
    }

    /// Load, derive and wrap in a store.
    pub fn open(config: &DashboardConfig) -> Result<(Self, LoadReport)> {
        let (dataset, report) = load_and_derive(config)?;
        Ok((Self::new(dataset), report))
    }

    /// The dataset as of now; stays valid across later swaps.
    pub fn snapshot(&self) -> Arc<Dataset> {
        // A poisoned lock still holds a complete Arc; swaps never leave it half-written.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a new dataset, returning the previous one.
    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        let next = Arc::new(dataset);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Reload from disk. On failure the current dataset stays in place.
    pub fn reload(&self, config: &DashboardConfig) -> Result<LoadReport> {
        let (dataset, report) = load_and_derive(config)?;
        self.replace(dataset);
        log::info!("dataset reloaded from {}", report.weekly_file.display());
        Ok(report)
    }
}

/// One user's view of the dashboard.
#[derive(Debug, Clone)]
pub struct Session {
    state: InteractionState,
    /// Externally owned week-range control value.
    pub week_range: Option<WeekRange>,
    half_window: u32,
}

impl Session {
    pub fn new(config: &DashboardConfig, dataset: &Dataset) -> Self {
        Self {
            state: InteractionState::new(config),
            week_range: dataset.week_bounds().map(|(lo, hi)| [lo.max(1.0), hi]),
            half_window: config.drilldown_half_window,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn dispatch(&mut self, trigger: &Trigger) -> &InteractionState {
        let prev = std::mem::take(&mut self.state);
        self.state = transition(prev, trigger);
        &self.state
    }

    pub fn dispatch_cycle(&mut self, triggers: &[Trigger]) -> &InteractionState {
        let prev = std::mem::take(&mut self.state);
        self.state = apply_cycle(prev, triggers);
        &self.state
    }

    pub fn projector<'a>(&self, dataset: &'a Dataset) -> Projector<'a> {
        Projector::new(dataset, self.half_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMap;
    use crate::types::{Week, WeeklyRecord};
    use std::path::PathBuf;

    fn dataset(weeks: &[f64]) -> Dataset {
        Dataset {
            records: weeks
                .iter()
                .map(|&w| WeeklyRecord::new(Week::Number(w), "ICU"))
                .collect(),
            columns: ColumnMap::new("week", "service"),
            source: PathBuf::from("services_weekly.csv"),
            staff_schedule: None,
            staff_roster: None,
            patient_roster: None,
        }
    }

    #[test]
    fn replace_swaps_whole_reference() {
        let store = DatasetStore::new(dataset(&[1.0, 2.0]));
        let before = store.snapshot();
        let old = store.replace(dataset(&[1.0, 2.0, 3.0]));
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(before.records.len(), 2);
        assert_eq!(store.snapshot().records.len(), 3);
    }

    #[test]
    fn sessions_are_independent() {
        let ds = dataset(&[1.0, 2.0, 3.0]);
        let cfg = DashboardConfig::default();
        let mut a = Session::new(&cfg, &ds);
        let b = Session::new(&cfg, &ds);
        a.dispatch(&Trigger::cell_click("ICU", 2));
        assert!(a.state().has_selection());
        assert!(!b.state().has_selection());
        assert_eq!(a.week_range, Some([1.0, 3.0]));
    }

    #[test]
    fn dispatch_cycle_uses_priority() {
        let ds = dataset(&[1.0]);
        let mut s = Session::new(&DashboardConfig::default(), &ds);
        s.dispatch(&Trigger::cell_click("ICU", 1));
        s.dispatch_cycle(&[Trigger::cell_click("ICU", 1), Trigger::ClearSelection]);
        assert!(!s.state().has_selection());
    }
}
