//! Hospital bed-flow analytics core.
//!
//! Loads weekly per-service capacity tables, derives refusal, utilization
//! and staffing metrics, and keeps the per-session selection/filter state
//! that drives the coordinated dashboard views. Rendering is left to the
//! caller: it reads a [`Dataset`] snapshot and an [`InteractionState`] and
//! asks the [`Projector`] for the rows each view needs.

pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod output;
pub mod projection;
pub mod reports;
pub mod schema;
pub mod state;
pub mod store;
pub mod types;
pub mod util;

pub use config::DashboardConfig;
pub use error::{BedflowError, Result};
pub use loader::{load_dataset, Dataset, LoadReport};
pub use metrics::derive_metrics;
pub use projection::Projector;
pub use schema::ColumnMap;
pub use state::{apply_cycle, transition, DiagnosticFocus, InteractionState, Trigger};
pub use store::{DatasetStore, Session};
