//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use penrelay_core::relay::BatchReport;
use penrelay_core::{Notice, NoticeLevel, SyncStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the outcome of one batch
    pub fn print_report(&self, report: &BatchReport) {
        match self.format {
            OutputFormat::Human => {
                if report.observed == 0 {
                    println!("Buffer is empty.");
                    return;
                }
                for note in &report.applied {
                    println!("  {} -> {}", note.id, note.outcome.path().display());
                }
                for rejected in &report.rejected {
                    println!("  skipped: {}", rejected);
                }
                println!(
                    "\n{} applied, {} superseded, {} skipped, {} purged",
                    report.applied.len(),
                    report.superseded,
                    report.rejected.len(),
                    report.purged
                );
                if let Some(ref e) = report.error {
                    println!("✗ {}", e);
                }
            }
            OutputFormat::Json => {
                println!("{}", report_json(report));
            }
            OutputFormat::Quiet => {
                for note in &report.applied {
                    println!("{}", note.outcome.path().display());
                }
            }
        }
    }

    /// Print a relay notice as it happens
    pub fn print_notice(&self, notice: &Notice) {
        match self.format {
            OutputFormat::Human => match notice.level {
                NoticeLevel::Info => println!("✓ {}", notice.message),
                NoticeLevel::Warning => println!("⚠ {}", notice.message),
                NoticeLevel::Error => eprintln!("✗ {}", notice.message),
            },
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"notice": notice}));
            }
            OutputFormat::Quiet => {
                if notice.level == NoticeLevel::Error {
                    eprintln!("{}", notice.message);
                }
            }
        }
    }

    /// Print a status transition
    pub fn print_status(&self, status: SyncStatus) {
        match self.format {
            OutputFormat::Human => println!("[{}]", status),
            OutputFormat::Json => println!("{}", serde_json::json!({"status": status})),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn report_json(report: &BatchReport) -> serde_json::Value {
    let applied: Vec<_> = report
        .applied
        .iter()
        .map(|note| {
            serde_json::json!({
                "id": note.id,
                "path": note.outcome.path(),
                "created": note.outcome.created_note(),
            })
        })
        .collect();
    let rejected: Vec<_> = report.rejected.iter().map(ToString::to_string).collect();

    serde_json::json!({
        "observed": report.observed,
        "applied": applied,
        "rejected": rejected,
        "superseded": report.superseded,
        "purged": report.purged,
        "cancelled": report.cancelled,
        "error": report.error.as_ref().map(ToString::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use penrelay_core::relay::AppliedNote;
    use penrelay_core::{Outcome, RelayError};
    use std::path::PathBuf;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_report_json() {
        let report = BatchReport {
            observed: 3,
            applied: vec![AppliedNote {
                id: "n1".to_string(),
                outcome: Outcome::Created {
                    path: PathBuf::from("AudioPen/Hello.md"),
                },
            }],
            superseded: 1,
            purged: 2,
            error: Some(RelayError::Configuration("unknown update mode 'x'".to_string())),
            ..BatchReport::default()
        };

        let json = report_json(&report);
        assert_eq!(json["observed"], 3);
        assert_eq!(json["applied"][0]["id"], "n1");
        assert_eq!(json["applied"][0]["path"], "AudioPen/Hello.md");
        assert_eq!(json["applied"][0]["created"], true);
        assert_eq!(json["purged"], 2);
        assert!(json["error"].as_str().unwrap().contains("unknown update mode"));
    }
}
