use anyhow::Result;
use mirror::{ProgressEvent, SyncStats};
use serde::Serialize;

/// How run output is written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Final line of a JSON-mode run
#[derive(Debug, Serialize)]
struct RunResult<'a> {
    cancelled: bool,
    errors: usize,
    stats: &'a SyncStats,
}

/// Renders progress events and keeps count of reported errors
pub struct Printer {
    mode: OutputMode,
    errors: usize,
}

impl Printer {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode, errors: 0 }
    }

    /// Number of error events seen so far
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn event(&mut self, event: &ProgressEvent) -> Result<()> {
        if let ProgressEvent::Error { .. } = event {
            self.errors += 1;
        }

        if self.mode == OutputMode::Json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }

        match event {
            ProgressEvent::Info { message } => println!("{}", message),
            ProgressEvent::Error { message } => eprintln!("error: {}", message),
            ProgressEvent::Status { message, stats } => {
                println!("[{}] {}", stats.status_line(), message)
            }
            // The terminal summary is printed by `finish`.
            ProgressEvent::Finished { .. } => {}
        }
        Ok(())
    }

    pub fn finish(&self, stats: &SyncStats, cancelled: bool) -> Result<()> {
        match self.mode {
            OutputMode::Json => {
                let result = RunResult {
                    cancelled,
                    errors: self.errors,
                    stats,
                };
                println!("{}", serde_json::to_string(&result)?);
            }
            OutputMode::Text => {
                println!();
                println!("{}", stats.summary());
                if self.errors > 0 {
                    println!("Errors: {}", self.errors);
                }
                if cancelled {
                    println!("\n*** Cancelled by user ***");
                } else {
                    println!("\n*** Finished ***");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_counted() {
        let mut printer = Printer::new(OutputMode::Json);
        printer.event(&ProgressEvent::Info { message: "x".to_string() }).unwrap();
        printer.event(&ProgressEvent::Error { message: "y".to_string() }).unwrap();
        printer.event(&ProgressEvent::Error { message: "z".to_string() }).unwrap();
        assert_eq!(printer.errors(), 2);
    }

    #[test]
    fn test_result_serializes_counters() {
        let mut stats = SyncStats::new();
        stats.record_new_file(12);
        let json = serde_json::to_value(RunResult {
            cancelled: true,
            errors: 0,
            stats: &stats,
        })
        .unwrap();
        assert_eq!(json["cancelled"], true);
        assert_eq!(json["stats"]["new_files"], 1);
        assert_eq!(json["stats"]["new_bytes"], 12);
    }
}
