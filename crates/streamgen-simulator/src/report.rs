//! End-of-run report generation.

use crate::config::OutputKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use streamgen_core::{CaseId, OrgSize};

/// Latency statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    /// Formats latency as a human-readable string.
    pub fn format_ms(&self) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!(
                "p50={:.1}ms p95={:.1}ms p99={:.1}ms",
                self.p50_us as f64 / 1000.0,
                self.p95_us as f64 / 1000.0,
                self.p99_us as f64 / 1000.0
            )
        }
    }
}

/// Counters for one organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgRow {
    pub org_id: String,
    pub case: Option<CaseId>,
    pub size: Option<OrgSize>,
    pub devices: u64,
    pub cycles: u64,
    pub events_last_cycle: u64,
    pub events_generated: u64,
    pub events_serialized: u64,
    /// Events that failed to serialize
    pub events_dropped: u64,
    pub bytes_serialized: u64,
    /// Serialized size of the most recent publish
    pub bytes_last_cycle: u64,
    pub records_delivered: u64,
    pub bytes_delivered: u64,
    pub batches_delivered: u64,
    pub batches_abandoned: u64,
    pub retry_rounds: u64,
    pub throttled_rounds: u64,
    pub generate_latency: LatencyStats,
    pub publish_latency: LatencyStats,
}

/// Sums over all organizations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub devices: u64,
    pub cycles: u64,
    pub events_generated: u64,
    pub events_serialized: u64,
    pub events_dropped: u64,
    pub bytes_serialized: u64,
    pub records_delivered: u64,
    pub bytes_delivered: u64,
    pub batches_delivered: u64,
    pub batches_abandoned: u64,
    pub retry_rounds: u64,
    pub throttled_rounds: u64,
}

impl Totals {
    pub fn from_rows(rows: &[OrgRow]) -> Self {
        rows.iter().fold(Totals::default(), |mut t, row| {
            t.devices += row.devices;
            t.cycles += row.cycles;
            t.events_generated += row.events_generated;
            t.events_serialized += row.events_serialized;
            t.events_dropped += row.events_dropped;
            t.bytes_serialized += row.bytes_serialized;
            t.records_delivered += row.records_delivered;
            t.bytes_delivered += row.bytes_delivered;
            t.batches_delivered += row.batches_delivered;
            t.batches_abandoned += row.batches_abandoned;
            t.retry_rounds += row.retry_rounds;
            t.throttled_rounds += row.throttled_rounds;
            t
        })
    }
}

/// Complete run report.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    // Configuration
    pub global_prefix: String,
    pub output: OutputKind,
    pub interval: Duration,
    pub dry_run: bool,
    pub duration: Duration,

    pub orgs: Vec<OrgRow>,
    pub totals: Totals,
}

impl Report {
    pub fn new(
        global_prefix: impl Into<String>,
        output: OutputKind,
        interval: Duration,
        dry_run: bool,
        duration: Duration,
        orgs: Vec<OrgRow>,
    ) -> Self {
        let totals = Totals::from_rows(&orgs);
        Self {
            global_prefix: global_prefix.into(),
            output,
            interval,
            dry_run,
            duration,
            orgs,
            totals,
        }
    }

    pub fn events_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.totals.events_generated as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn bytes_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.totals.bytes_serialized as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Records accepted by the destination but not yet acknowledged
    pub fn undelivered(&self) -> u64 {
        self.totals
            .events_serialized
            .saturating_sub(self.totals.records_delivered)
    }

    /// Generates a markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Streamgen Run Report\n\n");

        md.push_str("## Configuration\n\n");
        md.push_str("| Setting | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Prefix | {} |\n", self.global_prefix));
        md.push_str(&format!("| Output | {} |\n", self.output));
        md.push_str(&format!("| Interval | {:.1}s |\n", self.interval.as_secs_f64()));
        md.push_str(&format!("| Organizations | {} |\n", self.orgs.len()));
        md.push_str(&format!("| Duration | {:.1}s |\n", self.duration.as_secs_f64()));
        if self.dry_run {
            md.push_str("| Dry Run | yes |\n");
        }
        md.push('\n');

        md.push_str("## Throughput\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Devices | {} |\n", format_number(self.totals.devices)));
        md.push_str(&format!("| Cycles | {} |\n", format_number(self.totals.cycles)));
        md.push_str(&format!(
            "| Events Generated | {} |\n",
            format_number(self.totals.events_generated)
        ));
        md.push_str(&format!(
            "| Events Serialized | {} |\n",
            format_number(self.totals.events_serialized)
        ));
        md.push_str(&format!(
            "| Events Dropped | {} |\n",
            format_number(self.totals.events_dropped)
        ));
        md.push_str(&format!(
            "| Serialized | {} |\n",
            format_bytes(self.totals.bytes_serialized)
        ));
        md.push_str(&format!(
            "| Records Delivered | {} |\n",
            format_number(self.totals.records_delivered)
        ));
        md.push_str(&format!(
            "| Rate | {:.0} events/s |\n",
            self.events_per_second()
        ));
        md.push_str(&format!(
            "| Bandwidth | {}/s |\n",
            format_bytes(self.bytes_per_second() as u64)
        ));
        md.push_str(&format!("| Retry Rounds | {} |\n", self.totals.retry_rounds));
        md.push_str(&format!("| Throttled Rounds | {} |\n", self.totals.throttled_rounds));
        md.push_str(&format!("| Abandoned Batches | {} |\n", self.totals.batches_abandoned));
        md.push('\n');

        md.push_str("## Organizations\n\n");
        md.push_str("| Org | Case | Size | Devices | Cycles | Events | Delivered | Last Cycle | Generate | Publish |\n");
        md.push_str("|-----|------|------|---------|--------|--------|-----------|------------|----------|---------|\n");
        for row in &self.orgs {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
                row.org_id,
                row.case.map(|c| c.as_str()).unwrap_or("-"),
                row.size.map(|s| s.as_str()).unwrap_or("-"),
                format_number(row.devices),
                format_number(row.cycles),
                format_number(row.events_generated),
                format_number(row.records_delivered),
                format_bytes(row.bytes_last_cycle),
                row.generate_latency.format_ms(),
                row.publish_latency.format_ms(),
            ));
        }
        md.push('\n');

        md.push_str("## Summary\n\n");
        if self.totals.batches_abandoned > 0 {
            md.push_str(&format!(
                "**{} batches were abandoned after hard errors**\n",
                self.totals.batches_abandoned
            ));
        } else if self.undelivered() > 0 {
            md.push_str(&format!(
                "**{} records were still in flight at shutdown**\n",
                format_number(self.undelivered())
            ));
        } else {
            md.push_str("**All serialized events were delivered**\n");
        }

        md
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Prints a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("STREAMGEN RESULTS");
        println!("{}", "=".repeat(60));

        println!(
            "\nOutput: {} | Orgs: {} | Duration: {:.1}s",
            self.output,
            self.orgs.len(),
            self.duration.as_secs_f64()
        );

        println!("\nEVENTS:");
        println!(
            "   Generated: {} ({:.0}/s)",
            format_number(self.totals.events_generated),
            self.events_per_second()
        );
        println!(
            "   Serialized: {} ({}/s)",
            format_bytes(self.totals.bytes_serialized),
            format_bytes(self.bytes_per_second() as u64)
        );
        println!(
            "   Delivered: {}",
            format_number(self.totals.records_delivered)
        );
        if self.totals.events_dropped > 0 {
            println!("   Dropped: {}", format_number(self.totals.events_dropped));
        }
        if self.totals.throttled_rounds > 0 {
            println!("   Throttled rounds: {}", self.totals.throttled_rounds);
        }
        if self.totals.batches_abandoned > 0 {
            println!("   Abandoned batches: {}", self.totals.batches_abandoned);
        }

        for row in &self.orgs {
            println!(
                "\n   [{}] {} events, last cycle {}, generate {}, publish {}",
                row.org_id,
                format_number(row.events_generated),
                format_bytes(row.bytes_last_cycle),
                row.generate_latency.format_ms(),
                row.publish_latency.format_ms()
            );
        }

        println!("\n{}", "=".repeat(60));
    }
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
