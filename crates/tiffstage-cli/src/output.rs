//! Renderers for the final run summary.

use anyhow::anyhow;
use tiffstage_pipeline::RunSummary;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

pub(crate) fn render_summary(summary: &RunSummary, format: OutputFormat) -> CliResult<()> {
    println!("{}", format_summary(summary, format)?);
    Ok(())
}

fn format_summary(summary: &RunSummary, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(summary)
            .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}"))),
        OutputFormat::Text => {
            let mut lines = vec![
                format!("run: {}", summary.run_id),
                format!("root: {}", summary.root.display()),
                format!(
                    "files: {} total, {} already done, {} scheduled",
                    summary.total, summary.already_done, summary.scheduled
                ),
                format!(
                    "outcomes: {} accepted, {} rejected, {} failed",
                    summary.accepted, summary.rejected, summary.failed
                ),
            ];
            if summary.stale_parts_removed > 0 {
                lines.push(format!(
                    "removed {} leftover temporaries",
                    summary.stale_parts_removed
                ));
            }
            if summary.cancelled {
                lines.push("cancelled before every file was processed".to_owned());
            }
            Ok(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn summary() -> RunSummary {
        let mut summary = RunSummary::new(Uuid::nil(), PathBuf::from("/mnt/share"));
        summary.total = 10;
        summary.already_done = 4;
        summary.scheduled = 6;
        summary.accepted = 4;
        summary.rejected = 1;
        summary.failed = 1;
        summary
    }

    #[test]
    fn text_summary_lists_counts() -> Result<()> {
        let text = format_summary(&summary(), OutputFormat::Text)
            .map_err(|err| anyhow!(err.display_message()))?;
        assert!(text.contains("files: 10 total, 4 already done, 6 scheduled"));
        assert!(text.contains("outcomes: 4 accepted, 1 rejected, 1 failed"));
        assert!(!text.contains("cancelled"));
        Ok(())
    }

    #[test]
    fn json_summary_is_machine_readable() -> Result<()> {
        let mut cancelled = summary();
        cancelled.cancelled = true;
        let text = format_summary(&cancelled, OutputFormat::Json)
            .map_err(|err| anyhow!(err.display_message()))?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["accepted"], 4);
        assert_eq!(value["cancelled"], true);
        assert_eq!(value["root"], "/mnt/share");
        Ok(())
    }
}
