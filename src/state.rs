//! Per-session interaction state and its transition rules.
//!
//! A session's state only changes through [`transition`]: it takes the
//! previous value and one trigger and returns the next value. When several
//! controls fire in the same update cycle, [`apply_cycle`] applies only the
//! highest-priority trigger.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::config::DashboardConfig;

/// Service filter value meaning "no restriction".
pub const ALL_SERVICES: &str = "__ALL__";

/// Metric emphasised by the locator heatmap and the diagnostic view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticFocus {
    #[default]
    RefusalRate,
    PatientsPerStaff,
    BedUtilization,
}

impl DiagnosticFocus {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "refusal_rate" => Some(Self::RefusalRate),
            "patients_per_staff" => Some(Self::PatientsPerStaff),
            "bed_utilization" => Some(Self::BedUtilization),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::RefusalRate => "refusal_rate",
            Self::PatientsPerStaff => "patients_per_staff",
            Self::BedUtilization => "bed_utilization",
        }
    }

    /// Heading used for the locator view.
    pub fn label(self) -> &'static str {
        match self {
            Self::RefusalRate => "Refusal Rate",
            Self::PatientsPerStaff => "Staffing Pressure",
            Self::BedUtilization => "Bed Saturation",
        }
    }
}

/// Secondary views able to emit a week-range brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushSource {
    DiagnosticTimeline,
    ImpactValidation,
}

/// The (service, week) pair selected for detailed inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillDown {
    pub service: String,
    pub week: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    drilldown: Option<DrillDown>,
    diagnostic_focus: DiagnosticFocus,
    visible_events: BTreeSet<String>,
    service_filter: String,
    brush_range: Option<[f64; 2]>,
    brush_source: Option<BrushSource>,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new(&DashboardConfig::default())
    }
}

impl InteractionState {
    /// Fresh session state: no selection, no brush, all services.
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            drilldown: None,
            diagnostic_focus: DiagnosticFocus::default(),
            visible_events: config.default_visible_events.iter().cloned().collect(),
            service_filter: ALL_SERVICES.to_string(),
            brush_range: None,
            brush_source: None,
        }
    }

    pub fn drilldown(&self) -> Option<&DrillDown> {
        self.drilldown.as_ref()
    }

    pub fn selected_service(&self) -> Option<&str> {
        self.drilldown.as_ref().map(|d| d.service.as_str())
    }

    pub fn selected_week(&self) -> Option<i64> {
        self.drilldown.as_ref().map(|d| d.week)
    }

    pub fn has_selection(&self) -> bool {
        self.drilldown.is_some()
    }

    pub fn diagnostic_focus(&self) -> DiagnosticFocus {
        self.diagnostic_focus
    }

    pub fn visible_events(&self) -> &BTreeSet<String> {
        &self.visible_events
    }

    pub fn service_filter(&self) -> &str {
        &self.service_filter
    }

    /// The filtered service, or `None` for "all services".
    pub fn filtered_service(&self) -> Option<&str> {
        (self.service_filter != ALL_SERVICES).then_some(self.service_filter.as_str())
    }

    pub fn brush_range(&self) -> Option<[f64; 2]> {
        self.brush_range
    }

    /// Reset to `None` whenever a brush is applied or cleared.
    pub fn brush_source(&self) -> Option<BrushSource> {
        self.brush_source
    }

    fn clear_brush(&mut self) {
        self.brush_range = None;
        self.brush_source = None;
    }
}

/// A discrete input event, listed from highest to lowest priority.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    ClearSelection,
    ServiceFilter(String),
    /// Raw click payload as emitted by the heatmap: `{"points": [{"x": week, "y": service}]}`.
    HeatmapClick(Value),
    /// Range emitted by a secondary view; `None` when that view has no active range.
    Brush {
        source: BrushSource,
        range: Option<[f64; 2]>,
    },
    DiagnosticFocus(DiagnosticFocus),
    EventVisibility(BTreeSet<String>),
}

impl Trigger {
    /// Click payload for a single heatmap cell.
    pub fn cell_click(service: &str, week: i64) -> Self {
        Trigger::HeatmapClick(serde_json::json!({ "points": [{ "x": week, "y": service }] }))
    }

    /// Lower is stronger.
    pub fn priority(&self) -> u8 {
        match self {
            Trigger::ClearSelection => 0,
            Trigger::ServiceFilter(_) => 1,
            Trigger::HeatmapClick(_) => 2,
            Trigger::Brush { .. } => 3,
            Trigger::DiagnosticFocus(_) => 4,
            Trigger::EventVisibility(_) => 5,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Trigger::ClearSelection => "clear-selection",
            Trigger::ServiceFilter(_) => "service-filter",
            Trigger::HeatmapClick(_) => "heatmap-click",
            Trigger::Brush { .. } => "brush",
            Trigger::DiagnosticFocus(_) => "diagnostic-focus",
            Trigger::EventVisibility(_) => "event-visibility",
        }
    }
}

/// Extract `(service, week)` from a heatmap click payload.
///
/// The week may arrive as an integer, a float (truncated) or a numeric
/// string. Anything else yields `None`.
pub fn parse_click(payload: &Value) -> Option<(String, i64)> {
    let point = payload.get("points")?.as_array()?.first()?;
    let service = point.get("y")?.as_str()?.to_string();
    let week = match point.get("x")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some((service, week))
}

/// Apply one trigger to the previous state.
pub fn transition(mut state: InteractionState, trigger: &Trigger) -> InteractionState {
    match trigger {
        Trigger::ClearSelection => {
            state.drilldown = None;
            if state.brush_range.is_some() {
                state.clear_brush();
            }
        }
        Trigger::ServiceFilter(value) => {
            state.service_filter = value.clone();
            let inconsistent = state
                .drilldown
                .as_ref()
                .is_some_and(|d| value != ALL_SERVICES && *value != d.service);
            if inconsistent {
                log::debug!("service filter '{}' drops selection", value);
                state.drilldown = None;
            }
        }
        Trigger::HeatmapClick(payload) => {
            let Some((service, week)) = parse_click(payload) else {
                log::debug!("ignoring malformed heatmap click: {}", payload);
                return state;
            };
            let same = state
                .drilldown
                .as_ref()
                .is_some_and(|d| d.service == service && d.week == week);
            if same {
                state.drilldown = None;
            } else {
                state.drilldown = Some(DrillDown { service, week });
                state.clear_brush();
            }
        }
        Trigger::Brush { source, range } => {
            let Some([a, b]) = *range else {
                log::debug!("{:?} has no active range; brush ignored", source);
                return state;
            };
            if !a.is_finite() || !b.is_finite() {
                return state;
            }
            let range = [a.min(b), a.max(b)];
            if state.brush_range == Some(range) {
                return state;
            }
            state.brush_range = Some(range);
            state.brush_source = None;
        }
        Trigger::DiagnosticFocus(focus) => {
            state.diagnostic_focus = *focus;
        }
        Trigger::EventVisibility(events) => {
            state.visible_events = events.clone();
        }
    }
    state
}

/// Apply the single highest-priority trigger of one update cycle.
///
/// Ties go to the trigger listed first. An empty cycle returns the state
/// unchanged.
pub fn apply_cycle(state: InteractionState, triggers: &[Trigger]) -> InteractionState {
    let Some(winner) = triggers.iter().min_by_key(|t| t.priority()) else {
        return state;
    };
    if triggers.len() > 1 {
        log::debug!(
            "{} simultaneous triggers; applying {}",
            triggers.len(),
            winner.name()
        );
    }
    transition(state, winner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> InteractionState {
        InteractionState::default()
    }

    fn selected(service: &str, week: i64) -> InteractionState {
        transition(state(), &Trigger::cell_click(service, week))
    }

    #[test]
    fn defaults() {
        let s = state();
        assert!(!s.has_selection());
        assert_eq!(s.diagnostic_focus(), DiagnosticFocus::RefusalRate);
        assert_eq!(s.service_filter(), ALL_SERVICES);
        assert_eq!(s.visible_events().len(), 3);
        assert!(s.brush_range().is_none());
    }

    #[test]
    fn click_selects_cell() {
        let s = selected("ICU", 2);
        assert_eq!(s.selected_service(), Some("ICU"));
        assert_eq!(s.selected_week(), Some(2));
    }

    #[test]
    fn second_click_on_same_cell_toggles_off() {
        let before = state();
        let s = transition(before.clone(), &Trigger::cell_click("ICU", 2));
        let s = transition(s, &Trigger::cell_click("ICU", 2));
        assert_eq!(s.selected_service(), None);
        assert_eq!(s.selected_week(), None);
        assert_eq!(s, before);
    }

    #[test]
    fn click_on_other_cell_moves_selection_and_drops_brush() {
        let s = selected("ICU", 2);
        let s = transition(
            s,
            &Trigger::Brush { source: BrushSource::DiagnosticTimeline, range: Some([1.0, 4.0]) },
        );
        assert!(s.brush_range().is_some());
        let s = transition(s, &Trigger::cell_click("ER", 5));
        assert_eq!(s.selected_service(), Some("ER"));
        assert_eq!(s.selected_week(), Some(5));
        assert!(s.brush_range().is_none());
        assert!(s.brush_source().is_none());
    }

    #[test]
    fn malformed_clicks_are_noops() {
        let s = selected("ICU", 2);
        for payload in [
            json!(null),
            json!({}),
            json!({ "points": [] }),
            json!({ "points": [{ "x": 3 }] }),
            json!({ "points": [{ "x": "abc", "y": "ER" }] }),
            json!({ "points": [{ "x": 3, "y": 7 }] }),
        ] {
            let next = transition(s.clone(), &Trigger::HeatmapClick(payload));
            assert_eq!(next, s);
        }
    }

    #[test]
    fn click_week_accepts_float_and_string() {
        assert_eq!(
            parse_click(&json!({ "points": [{ "x": 4.0, "y": "ICU" }] })),
            Some(("ICU".to_string(), 4))
        );
        assert_eq!(
            parse_click(&json!({ "points": [{ "x": "7", "y": "ER" }] })),
            Some(("ER".to_string(), 7))
        );
    }

    #[test]
    fn conflicting_service_filter_clears_selection() {
        let s = transition(selected("ICU", 3), &Trigger::ServiceFilter("ER".into()));
        assert_eq!(s.service_filter(), "ER");
        assert!(!s.has_selection());
    }

    #[test]
    fn consistent_service_filter_keeps_selection() {
        let s = transition(selected("ICU", 3), &Trigger::ServiceFilter("ICU".into()));
        assert_eq!(s.selected_service(), Some("ICU"));
        let s = transition(s, &Trigger::ServiceFilter(ALL_SERVICES.into()));
        assert_eq!(s.selected_week(), Some(3));
        assert_eq!(s.filtered_service(), None);
    }

    #[test]
    fn clear_drops_selection_and_brush() {
        let s = transition(
            selected("ICU", 3),
            &Trigger::Brush { source: BrushSource::ImpactValidation, range: Some([2.0, 6.0]) },
        );
        let s = transition(s, &Trigger::ClearSelection);
        assert!(!s.has_selection());
        assert!(s.brush_range().is_none());
        assert!(s.brush_source().is_none());
    }

    #[test]
    fn repeated_brush_is_noop_and_inactive_view_is_ignored() {
        let brush = Trigger::Brush { source: BrushSource::DiagnosticTimeline, range: Some([6.0, 2.0]) };
        let once = transition(state(), &brush);
        assert_eq!(once.brush_range(), Some([2.0, 6.0]));
        assert_eq!(once.brush_source(), None);
        let twice = transition(once.clone(), &brush);
        assert_eq!(twice, once);

        let idle = Trigger::Brush { source: BrushSource::ImpactValidation, range: None };
        assert_eq!(transition(once.clone(), &idle), once);
    }

    #[test]
    fn controls_update_focus_and_events() {
        let s = transition(state(), &Trigger::DiagnosticFocus(DiagnosticFocus::BedUtilization));
        assert_eq!(s.diagnostic_focus(), DiagnosticFocus::BedUtilization);
        let s = transition(s, &Trigger::EventVisibility(BTreeSet::new()));
        assert!(s.visible_events().is_empty());
    }

    #[test]
    fn filter_focus_and_event_triggers_are_idempotent() {
        let events: BTreeSet<String> = ["flu".to_string()].into_iter().collect();
        for trigger in [
            Trigger::ServiceFilter("ICU".into()),
            Trigger::ServiceFilter("ER".into()),
            Trigger::ServiceFilter(ALL_SERVICES.into()),
            Trigger::DiagnosticFocus(DiagnosticFocus::PatientsPerStaff),
            Trigger::EventVisibility(events.clone()),
        ] {
            let once = transition(selected("ICU", 3), &trigger);
            let twice = transition(once.clone(), &trigger);
            assert_eq!(twice, once, "{:?}", trigger);
        }
    }

    #[test]
    fn cycle_applies_only_highest_priority_trigger() {
        let s = selected("ICU", 3);
        let s = apply_cycle(
            s,
            &[
                Trigger::cell_click("ER", 9),
                Trigger::ServiceFilter("ICU".into()),
                Trigger::DiagnosticFocus(DiagnosticFocus::PatientsPerStaff),
            ],
        );
        assert_eq!(s.service_filter(), "ICU");
        assert_eq!(s.selected_service(), Some("ICU"));
        assert_eq!(s.selected_week(), Some(3));
        assert_eq!(s.diagnostic_focus(), DiagnosticFocus::RefusalRate);
        assert_eq!(apply_cycle(s.clone(), &[]), s);
    }

    #[test]
    fn focus_keys_round_trip() {
        for f in [
            DiagnosticFocus::RefusalRate,
            DiagnosticFocus::PatientsPerStaff,
            DiagnosticFocus::BedUtilization,
        ] {
            assert_eq!(DiagnosticFocus::from_key(f.key()), Some(f));
        }
        assert_eq!(DiagnosticFocus::from_key("bogus"), None);
    }

    #[test]
    fn state_serializes_for_the_rendering_layer() {
        let s = selected("ICU", 2);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["drilldown"]["service"], "ICU");
        assert_eq!(v["service_filter"], "__ALL__");
        assert_eq!(v["diagnostic_focus"], "refusal_rate");
        let back: InteractionState = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }
}
