// Entry point for the `bedflow` command.
//
// Loads the weekly capacity data once, prints a load report and a per-service
// preview, and optionally exports the derived table:
//   bedflow [DATA_DIR] [--config PATH] [--export DIR]
use bedflow::output;
use bedflow::reports;
use bedflow::types::DerivedExportRow;
use bedflow::util;
use bedflow::{DashboardConfig, DatasetStore, LoadReport, Session};
use clap::Parser;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::path::PathBuf;

// Loaded once per process; sessions take snapshots from here.
static STORE: OnceCell<DatasetStore> = OnceCell::new();

#[derive(Parser, Debug)]
#[command(
    name = "bedflow",
    about = "Load weekly bed-flow data, derive capacity metrics and print a service overview."
)]
struct CliArgs {
    /// Directory holding the weekly CSV and optional auxiliary files
    #[arg(env = "BEDFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON config file; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write weekly_derived.csv and summary.json into this directory
    #[arg(long)]
    export: Option<PathBuf>,
}

fn build_config(args: &CliArgs) -> Result<DashboardConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_json_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_load_report(report: &LoadReport) {
    println!(
        "Processing dataset... ({} rows loaded from {})",
        util::format_int(report.loaded_rows),
        report.weekly_file.display()
    );
    if report.skipped_rows > 0 {
        println!(
            "Note: {} rows skipped for missing week or service.",
            util::format_int(report.skipped_rows)
        );
    }
    if !report.missing_optional.is_empty() {
        println!("Note: optional fields not found: {}", report.missing_optional.join(", "));
    }
    if !report.aux_files.is_empty() {
        println!("Info: auxiliary files loaded: {}", report.aux_files.join(", "));
    }
    println!();
}

fn run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    let config = build_config(&args)?;
    let (store, report) = DatasetStore::open(&config)?;
    print_load_report(&report);
    let store = STORE.get_or_init(|| store);

    let data = store.snapshot();
    let summary_rows = reports::service_summary(&data);
    println!("Service Overview");
    println!("(Worst average refusal rate first)\n");
    output::preview_table_rows(&summary_rows, config.preview_rows);

    let session = Session::new(&config, &data);
    let grid = session.projector(&data).heatmap(session.state(), session.week_range);
    println!(
        "Locator: {} ({} services × {} weeks)\n",
        grid.title,
        grid.services.len(),
        grid.weeks.len()
    );

    if let Some(dir) = &args.export {
        std::fs::create_dir_all(dir)?;
        let rows: Vec<DerivedExportRow> = data.records.iter().map(DerivedExportRow::from).collect();
        let table_path = dir.join("weekly_derived.csv");
        output::write_csv(&table_path, &rows)?;
        let summary = reports::generate_summary(&data);
        let summary_path = dir.join("summary.json");
        output::write_json(&summary_path, &summary)?;
        println!("Exported {} and {}", table_path.display(), summary_path.display());
        println!(
            "{{\"global_refusal_rate\": {}, \"services\": {}}}\n",
            util::format_number(summary.global_refusal_rate, 4),
            summary.total_services
        );
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    if let Err(e) = run(args) {
        eprintln!("Failed to load dashboard data: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn positional_dir_and_flags() {
        let a = CliArgs::try_parse_from(["bedflow", "data2", "--export", "out"]).unwrap();
        assert_eq!(a.data_dir, Some(PathBuf::from("data2")));
        assert_eq!(a.export, Some(PathBuf::from("out")));
        assert!(a.config.is_none());
    }

    #[test]
    fn rejects_unknown_flags_and_missing_values() {
        assert!(CliArgs::try_parse_from(["bedflow", "--verbose"]).is_err());
        assert!(CliArgs::try_parse_from(["bedflow", "--config"]).is_err());
        assert!(CliArgs::try_parse_from(["bedflow", "a", "b"]).is_err());
    }

    #[test]
    fn data_dir_argument_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("bedflow.json");
        std::fs::write(&cfg_path, r#"{"data_dir": "from_file", "preview_rows": 9}"#).unwrap();
        let cfg_arg = cfg_path.to_string_lossy().into_owned();

        let a = CliArgs::try_parse_from(["bedflow", "cli_dir", "--config", cfg_arg.as_str()]).unwrap();
        let cfg = build_config(&a).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("cli_dir"));
        assert_eq!(cfg.preview_rows, 9);
    }
}
