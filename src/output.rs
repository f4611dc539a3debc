//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! Converting 3 files with 3 workers
//! 001 dawn.tif → 0.5x-dawn.png
//! 002 (missing.png) skipped: IO error: No such file or directory
//! 003 dusk.png → 0.5x-dusk.png
//! Converted 2 of 3 files in 1.42s (1 skipped)
//! ```
//!
//! ## Cache
//!
//! ```text
//! Cache: /home/me/.config/TifTiff/cache
//!     Entries: 3 (config: 2, default: 1)
//!     Size: 2.0 KB
//!     Last cleanup: 2026-10-18 09:12:44 UTC
//! ```
//!
//! ## CRS list
//!
//! ```text
//! EPSG:4326    WGS 84 (EPSG:4326)
//! EPSG:3857    Web Mercator (EPSG:3857)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::cache::CacheInfo;
use crate::metadata::Summary;
use crate::process::ProcessEvent;
use crate::types::FileOutcome;
use serde_json::{Map, Value};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Human-readable byte count: `512 B`, `2.0 KB`, `1.5 MB`, `3.0 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// JSON values print bare when they are strings.
fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Batch runs
// ============================================================================

/// One line per file, with `→` for produced outputs.
///
/// ```text
/// 001 dawn.tif → 0.5x-dawn.png
/// 002 (missing.png) skipped: IO error
/// ```
pub fn format_outcome(index: usize, outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Produced { source, output } => format!(
            "{} {} → {}",
            format_index(index),
            file_name(source),
            file_name(output)
        ),
        FileOutcome::Skipped { source, reason } => format!(
            "{} ({}) skipped: {reason}",
            format_index(index),
            file_name(source)
        ),
    }
}

pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::RunStarted { total, workers } => {
            vec![format!(
                "Converting {total} file{} with {workers} worker{}",
                if *total == 1 { "" } else { "s" },
                if *workers == 1 { "" } else { "s" }
            )]
        }
        ProcessEvent::FileFinished { index, outcome, .. } => {
            vec![format_outcome(*index, outcome)]
        }
        ProcessEvent::RunFinished {
            produced,
            total,
            elapsed,
        } => {
            let skipped = total - produced;
            let mut line = format!(
                "Converted {produced} of {total} files in {:.2}s",
                elapsed.as_secs_f64()
            );
            if skipped > 0 {
                line.push_str(&format!(" ({skipped} skipped)"));
            }
            vec![line]
        }
    }
}

/// Outcomes of a standalone reprojection batch, followed by a count.
pub fn format_reproject_output(outcomes: &[FileOutcome], target_crs: &str) -> Vec<String> {
    let mut lines: Vec<String> = outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| format_outcome(i + 1, o))
        .collect();
    let produced = outcomes.iter().filter(|o| o.is_produced()).count();
    lines.push(format!(
        "Reprojected {produced} of {} files to {target_crs}",
        outcomes.len()
    ));
    lines
}

pub fn print_reproject_output(outcomes: &[FileOutcome], target_crs: &str) {
    for line in format_reproject_output(outcomes, target_crs) {
        println!("{}", line);
    }
}

// ============================================================================
// Geo
// ============================================================================

pub fn format_detect_crs(path: &Path, crs: Option<&str>) -> String {
    format!("{}: {}", file_name(path), crs.unwrap_or("no CRS"))
}

pub fn format_crs_list(entries: &[(&str, &str)]) -> Vec<String> {
    entries
        .iter()
        .map(|(display, code)| format!("{code:<12} {display}"))
        .collect()
}

pub fn print_crs_list(entries: &[(&str, &str)]) {
    for line in format_crs_list(entries) {
        println!("{}", line);
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Summary of a metadata export.
///
/// ```text
/// Metadata: 2 files, 12.3 KB
///     png: 1
///     tif: 1
///     → metadata.csv
/// ```
pub fn format_metadata_summary(summary: &Summary, written: &[&Path]) -> Vec<String> {
    let mut lines = vec![format!(
        "Metadata: {} file{}, {}",
        summary.total_files,
        if summary.total_files == 1 { "" } else { "s" },
        summary.total_size_human
    )];
    for (format, count) in &summary.formats {
        lines.push(format!("    {format}: {count}"));
    }
    for path in written {
        lines.push(format!("    → {}", path.display()));
    }
    lines
}

pub fn print_metadata_summary(summary: &Summary, written: &[&Path]) {
    for line in format_metadata_summary(summary, written) {
        println!("{}", line);
    }
}

// ============================================================================
// Config and cache
// ============================================================================

/// Settings as sorted `key = value` lines.
pub fn format_config_list(values: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("{k} = {}", plain_value(&values[k])))
        .collect()
}

pub fn print_config_list(values: &Map<String, Value>) {
    for line in format_config_list(values) {
        println!("{}", line);
    }
}

pub fn format_config_value(key: &str, value: Option<&Value>) -> String {
    match value {
        Some(v) => format!("{key} = {}", plain_value(v)),
        None => format!("{key} is not set"),
    }
}

pub fn format_cache_info(cache_dir: &Path, info: &CacheInfo) -> Vec<String> {
    let mut entries = info.total_entries.to_string();
    if !info.categories.is_empty() {
        let parts: Vec<String> = info
            .categories
            .iter()
            .map(|(name, count)| format!("{name}: {count}"))
            .collect();
        entries.push_str(&format!(" ({})", parts.join(", ")));
    }
    vec![
        format!("Cache: {}", cache_dir.display()),
        format!("    Entries: {entries}"),
        format!("    Size: {}", info.total_size_human),
        format!(
            "    Last cleanup: {}",
            info.last_cleanup.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ]
}

pub fn print_cache_info(cache_dir: &Path, info: &CacheInfo) {
    for line in format_cache_info(cache_dir, info) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(1536 * 1024), "1.5 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn format_size_caps_at_gigabytes() {
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048.0 GB");
    }

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(1000), "1000");
    }

    // =========================================================================
    // Batch runs
    // =========================================================================

    #[test]
    fn produced_outcome_line() {
        let o = FileOutcome::Produced {
            source: PathBuf::from("/in/dawn.tif"),
            output: PathBuf::from("/out/0.5x-dawn.png"),
        };
        assert_eq!(format_outcome(1, &o), "001 dawn.tif → 0.5x-dawn.png");
    }

    #[test]
    fn skipped_outcome_line() {
        let o = FileOutcome::Skipped {
            source: PathBuf::from("/in/missing.png"),
            reason: "IO error".into(),
        };
        assert_eq!(format_outcome(2, &o), "002 (missing.png) skipped: IO error");
    }

    #[test]
    fn run_events() {
        let started = ProcessEvent::RunStarted {
            total: 1,
            workers: 1,
        };
        assert_eq!(format_process_event(&started), vec!["Converting 1 file with 1 worker"]);

        let finished = ProcessEvent::RunFinished {
            produced: 2,
            total: 3,
            elapsed: Duration::from_millis(1420),
        };
        assert_eq!(
            format_process_event(&finished),
            vec!["Converted 2 of 3 files in 1.42s (1 skipped)"]
        );
    }

    #[test]
    fn reproject_output_counts_produced() {
        let outcomes = vec![
            FileOutcome::Produced {
                source: "a.tif".into(),
                output: "out/a.tif".into(),
            },
            FileOutcome::Skipped {
                source: "b.tif".into(),
                reason: "no CRS".into(),
            },
        ];
        let lines = format_reproject_output(&outcomes, "EPSG:4326");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "Reprojected 1 of 2 files to EPSG:4326");
    }

    // =========================================================================
    // Geo, config, cache
    // =========================================================================

    #[test]
    fn detect_crs_line() {
        assert_eq!(
            format_detect_crs(Path::new("/x/utm.tif"), Some("EPSG:32648")),
            "utm.tif: EPSG:32648"
        );
        assert_eq!(format_detect_crs(Path::new("a.png"), None), "a.png: no CRS");
    }

    #[test]
    fn crs_list_aligns_codes() {
        let lines = format_crs_list(&[("WGS 84 (EPSG:4326)", "EPSG:4326")]);
        assert_eq!(lines, vec!["EPSG:4326    WGS 84 (EPSG:4326)"]);
    }

    #[test]
    fn config_list_is_sorted_and_unquoted() {
        let mut values = Map::new();
        values.insert("theme".into(), json!("cosmo"));
        values.insert("scale_ratio".into(), json!(1.0));
        assert_eq!(
            format_config_list(&values),
            vec!["scale_ratio = 1.0", "theme = cosmo"]
        );
        assert_eq!(format_config_value("x", None), "x is not set");
    }

    #[test]
    fn cache_info_lines() {
        let mut categories = BTreeMap::new();
        categories.insert("config".to_string(), 2);
        let info = CacheInfo {
            total_entries: 2,
            total_size: 2048,
            total_size_human: "2.0 KB".into(),
            categories,
            last_cleanup: chrono::DateTime::from_timestamp(0, 0).unwrap(),
        };
        let lines = format_cache_info(Path::new("/c"), &info);
        assert_eq!(lines[0], "Cache: /c");
        assert_eq!(lines[1], "    Entries: 2 (config: 2)");
        assert_eq!(lines[2], "    Size: 2.0 KB");
        assert_eq!(lines[3], "    Last cleanup: 1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn metadata_summary_lines() {
        let mut formats = BTreeMap::new();
        formats.insert("png".to_string(), 1);
        let summary = Summary {
            total_files: 1,
            generated_at: "2026-10-18 09:00:00".into(),
            formats,
            total_size: 100,
            total_size_human: "100 B".into(),
        };
        let out = PathBuf::from("meta.csv");
        let lines = format_metadata_summary(&summary, &[out.as_path()]);
        assert_eq!(lines, vec!["Metadata: 1 file, 100 B", "    png: 1", "    → meta.csv"]);
    }
}
