mod backup;
mod tracker;

pub use backup::{export_file_name, store_to_csv, BackupService, ExportFormat};
pub use tracker::{PlayerPatch, PlayerView, RefreshOverrides, StatsSource, TrackerService};
