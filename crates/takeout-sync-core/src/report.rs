use std::fmt;

use crate::batch::BatchReport;
use crate::record::RequiredChange;
use crate::result::{ErrorKind, FileResult};

/// Failed paths listed per category before the rest are summarized.
pub const MAX_LISTED_FAILURES: usize = 10;

const RULE: &str = "==================================================";

/// How a summary line should be emphasized. Terminals map this to color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Heading,
    Good,
    Warning,
    Bad,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub tone: Tone,
    pub text: String,
}

impl SummaryLine {
    fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    fn blank() -> Self {
        Self::new(Tone::Plain, "")
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn description(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NoMetadata => "Files without corresponding metadata JSON files",
        ErrorKind::InvalidMetadata => "Files with corrupted or invalid metadata JSON files",
        ErrorKind::ExifReadError => "Files where embedded metadata could not be read",
        ErrorKind::ExifWriteError => "Files where embedded metadata could not be written",
        ErrorKind::ProcessingError => "Files that encountered other processing errors",
    }
}

pub fn hint(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::NoMetadata => "Files without metadata: These may be files not from Google Photos",
        ErrorKind::InvalidMetadata => "Invalid metadata: Check if JSON files are corrupted",
        ErrorKind::ExifReadError => "Read errors: Files may be corrupted or unsupported format",
        ErrorKind::ExifWriteError => "Write errors: Check file permissions, disk space and that ffmpeg is installed",
        ErrorKind::ProcessingError => "Processing errors: Check the log for detailed error messages",
    }
}

pub fn render_summary(report: &BatchReport) -> Vec<SummaryLine> {
    let stats = &report.stats;
    let mut lines = vec![
        SummaryLine::blank(),
        SummaryLine::new(Tone::Heading, RULE),
        SummaryLine::new(Tone::Heading, "PROCESSING SUMMARY"),
        SummaryLine::new(Tone::Heading, RULE),
        SummaryLine::new(Tone::Plain, format!("Files processed: {}", stats.files_processed)),
    ];
    let updated_label = if report.preview {
        "Files that would be updated"
    } else {
        "Files updated"
    };
    lines.push(SummaryLine::new(
        Tone::Plain,
        format!("{}: {}", updated_label, stats.files_updated),
    ));
    lines.push(SummaryLine::new(
        Tone::Plain,
        format!("Files skipped (no changes): {}", stats.files_skipped),
    ));
    lines.push(SummaryLine::new(
        Tone::Plain,
        format!("GPS updates skipped (zero coordinates): {}", stats.gps_updates_skipped),
    ));

    if report.cancelled {
        let remaining = report.files_found.saturating_sub(stats.files_processed);
        lines.push(SummaryLine::new(
            Tone::Warning,
            format!("Interrupted: {} files were not processed", remaining),
        ));
    }

    if stats.errors > 0 {
        lines.push(SummaryLine::new(
            Tone::Bad,
            format!("Errors encountered: {}", stats.errors),
        ));
        render_failures(report, &mut lines);
    } else {
        lines.push(SummaryLine::new(Tone::Good, "No errors encountered"));
    }

    if report.preview && stats.files_updated > 0 {
        lines.push(SummaryLine::blank());
        lines.push(SummaryLine::new(
            Tone::Warning,
            "To apply these changes, run again without --dry-run",
        ));
    }
    lines
}

fn render_failures(report: &BatchReport, lines: &mut Vec<SummaryLine>) {
    if report.failures.is_empty() {
        return;
    }
    lines.push(SummaryLine::blank());
    lines.push(SummaryLine::new(Tone::Bad, RULE));
    lines.push(SummaryLine::new(Tone::Bad, "FAILED FILES REPORT"));
    lines.push(SummaryLine::new(Tone::Bad, RULE));

    for (kind, files) in report.failures.iter() {
        lines.push(SummaryLine::blank());
        lines.push(SummaryLine::new(
            Tone::Warning,
            format!("{} ({} files):", description(kind), files.len()),
        ));
        let mut sorted: Vec<_> = files.iter().collect();
        sorted.sort();
        for path in sorted.iter().take(MAX_LISTED_FAILURES) {
            lines.push(SummaryLine::new(Tone::Bad, format!("  • {}", path.display())));
        }
        if files.len() > MAX_LISTED_FAILURES {
            lines.push(SummaryLine::new(
                Tone::Warning,
                format!("  ... and {} more files", files.len() - MAX_LISTED_FAILURES),
            ));
        }
    }

    lines.push(SummaryLine::blank());
    lines.push(SummaryLine::new(Tone::Heading, "Recommendations:"));
    for (kind, _) in report.failures.iter() {
        lines.push(SummaryLine::new(Tone::Plain, format!("  • {}", hint(kind))));
    }
}

/// The per-file block logged for an updated file.
pub fn describe_changes(result: &FileResult, preview: bool) -> Vec<String> {
    let action = if preview { "Would update" } else { "Updated" };
    let mut lines = vec![format!("{}: {}", action, result.file_name())];
    for change in &result.changes {
        lines.push(match change {
            RequiredChange::DateTime { from, to } => {
                format!("  Embedded datetime: {} → {}", display_or_none(from), to)
            }
            RequiredChange::Gps { from, to } => {
                format!("  GPS: {} → {}", display_or_none(from), to)
            }
            RequiredChange::FileTimestamps { from, to } => {
                format!("  File timestamp: {} → {}", from.modified, to.modified)
            }
        });
    }
    lines
}

fn display_or_none<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchStatistics, FailureRegistry};
    use crate::record::{local_from_unix, GeoPoint};
    use std::path::{Path, PathBuf};

    fn report(stats: BatchStatistics, failures: FailureRegistry, preview: bool) -> BatchReport {
        BatchReport {
            files_found: stats.files_processed,
            stats,
            failures,
            preview,
            cancelled: false,
        }
    }

    fn texts(lines: &[SummaryLine]) -> Vec<String> {
        lines.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_clean_run_summary() {
        let stats = BatchStatistics {
            files_processed: 5,
            files_updated: 2,
            files_skipped: 3,
            gps_updates_skipped: 1,
            errors: 0,
        };
        let lines = texts(&render_summary(&report(stats, FailureRegistry::default(), false)));
        assert!(lines.contains(&"Files processed: 5".to_string()));
        assert!(lines.contains(&"Files updated: 2".to_string()));
        assert!(lines.contains(&"Files skipped (no changes): 3".to_string()));
        assert!(lines.contains(&"GPS updates skipped (zero coordinates): 1".to_string()));
        assert_eq!(lines.last().unwrap(), "No errors encountered");
        assert!(!lines.iter().any(|l| l.contains("FAILED FILES")));
    }

    #[test]
    fn test_failures_are_listed_sorted_and_capped() {
        let mut failures = FailureRegistry::default();
        for i in (0..12).rev() {
            failures.record(ErrorKind::NoMetadata, PathBuf::from(format!("/p/{:02}.jpg", i)));
        }
        failures.record(ErrorKind::ExifWriteError, PathBuf::from("/p/ro.jpg"));
        let stats = BatchStatistics {
            files_processed: 13,
            errors: 13,
            ..Default::default()
        };
        let lines = texts(&render_summary(&report(stats, failures, false)));

        let header = lines
            .iter()
            .position(|l| l == "Files without corresponding metadata JSON files (12 files):")
            .unwrap();
        assert_eq!(lines[header + 1], "  • /p/00.jpg");
        assert_eq!(lines[header + 10], "  • /p/09.jpg");
        assert_eq!(lines[header + 11], "  ... and 2 more files");
        assert!(lines.contains(&"Files where embedded metadata could not be written (1 files):".to_string()));

        let hints: Vec<&String> = lines.iter().skip_while(|l| *l != "Recommendations:").skip(1).collect();
        assert_eq!(hints.len(), 2);
        assert!(hints[0].contains("Files without metadata"));
        assert!(hints[1].contains("Write errors"));
    }

    #[test]
    fn test_preview_summary_suggests_rerun() {
        let stats = BatchStatistics {
            files_processed: 1,
            files_updated: 1,
            ..Default::default()
        };
        let lines = texts(&render_summary(&report(stats, FailureRegistry::default(), true)));
        assert!(lines.contains(&"Files that would be updated: 1".to_string()));
        assert_eq!(lines.last().unwrap(), "To apply these changes, run again without --dry-run");
    }

    #[test]
    fn test_describe_changes() {
        let mut result = FileResult::new(Path::new("/p/a.jpg"));
        result.success = true;
        let to = local_from_unix(1_600_000_000).unwrap();
        result.changes = vec![
            RequiredChange::DateTime { from: None, to },
            RequiredChange::Gps {
                from: None,
                to: GeoPoint::new(1.0, 2.0),
            },
        ];
        let lines = describe_changes(&result, true);
        assert_eq!(lines[0], "Would update: a.jpg");
        assert_eq!(lines[1], format!("  Embedded datetime: none → {}", to));
        assert_eq!(lines[2], "  GPS: none → (1.000000, 2.000000)");
    }
}
