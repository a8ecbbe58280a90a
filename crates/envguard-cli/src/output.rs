//! Formatted output helpers for CLI commands.

use envguard_ebpf::pipeline::PipelineStats;
use serde::Serialize;

/// Serializes `value` as a single JSON line.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn json_line<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// One-line summary of a stopped pipeline.
#[must_use]
pub fn format_stats(stats: &PipelineStats) -> String {
    let p = &stats.processor;
    format!(
        "{} read, {} alert(s), {} unattributed, {} without namespace, {} malformed, {} read error(s)",
        stats.consumer.forwarded, p.alerts, p.unattributed, p.no_namespace, p.malformed, stats.consumer.read_errors,
    )
}

#[cfg(test)]
mod tests {
    use envguard_ebpf::consumer::ConsumerStats;
    use envguard_ebpf::processor::ProcessorStats;

    use super::*;

    #[test]
    fn json_line_has_no_newline() {
        let line = json_line(&serde_json::json!({"a": [1, 2]})).unwrap();
        assert_eq!(line, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn format_stats_lists_every_counter() {
        let stats = PipelineStats {
            consumer: ConsumerStats {
                forwarded: 10,
                read_errors: 1,
            },
            processor: ProcessorStats {
                processed: 10,
                alerts: 3,
                unattributed: 4,
                no_namespace: 2,
                malformed: 1,
            },
        };
        assert_eq!(
            format_stats(&stats),
            "10 read, 3 alert(s), 4 unattributed, 2 without namespace, 1 malformed, 1 read error(s)"
        );
    }
}
