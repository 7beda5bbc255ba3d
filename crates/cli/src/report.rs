//! End-of-run summary printing.

use mediaferry_pipeline::RunSummary;

pub fn print_summary(summary: &RunSummary) {
    println!("\n=== Transfer complete ===");
    println!("Destination folder: {}", summary.root_folder);
    for report in &summary.forms {
        println!(
            "  {}: {} transferred, {} skipped, {} failed",
            report.form.name,
            report.outcome.processed,
            report.outcome.skipped,
            report.outcome.failed,
        );
    }

    let stats = &summary.stats;
    println!(
        "Totals: {} found, {} transferred ({}), {} skipped, {} failed",
        stats.total_media,
        stats.transferred,
        format_mib(stats.total_bytes),
        stats.skipped,
        stats.failed,
    );
}

fn format_mib(bytes: u64) -> String {
    format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
}
