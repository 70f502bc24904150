//! Run summary rendering
//!
//! Prints the terminal summary of a run: record counts, extraction strategy hit
//! rates, email coverage and the failure breakdown.

use crate::output::RunSummary;

/// Hit rate of one strategy relative to the pages it could have served
fn rate(hits: u64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    }
}

/// Prints the run summary to stdout
///
/// # Arguments
///
/// * `summary` - The summary produced at the end of a run
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    println!("Overview:");
    println!("  Records emitted: {} / {}", summary.emitted, summary.target);
    println!("  Workers: {}", summary.concurrency);
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
    println!("  Throughput: {:.1} records/min", summary.records_per_minute());
    println!("  Pages fetched: {}", summary.metrics.pages_fetched);
    println!();

    let details = summary.emitted + summary.unresolved;
    let m = &summary.metrics;
    println!("Extraction:");
    println!(
        "  Structured markup: {} ({:.1}%)",
        m.structured_hits,
        rate(m.structured_hits, details)
    );
    println!("  DOM heuristics: {} ({:.1}%)", m.dom_hits, rate(m.dom_hits, details));
    println!(
        "  Schema AI: {} ({:.1}%)",
        m.schema_ai_hits,
        rate(m.schema_ai_hits, details)
    );
    println!(
        "  LLM fallback: {} ({:.1}%)",
        m.llm_fallbacks,
        rate(m.llm_fallbacks, details)
    );
    println!("  Unresolved pages: {}", summary.unresolved);
    println!();

    println!("Email:");
    println!("  Found: {}", m.emails_found);
    println!("  Missing: {}", m.emails_missing);
    println!("  Coverage: {:.1}%", summary.email_rate());
    println!();

    println!("Access:");
    println!("  Soft blocks: {}", m.soft_blocks);
    println!("  Captcha challenges: {}", m.captcha_challenges);
    println!("  Identity rotations: {}", m.identity_rotations);
    println!();

    if !m.failures.is_empty() {
        println!("Failures:");
        let mut failures: Vec<_> = m.failures.iter().collect();
        failures.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in failures {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Tasks ({} total, {} failed):",
        summary.tasks_total, summary.tasks_failed
    );
    for (label, outcome) in &summary.task_outcomes {
        println!("  - {}: {}", label, outcome);
    }

    if summary.skipped_cap > 0 {
        println!();
        println!(
            "Skipped {} detail pages after the target was reached",
            summary.skipped_cap
        );
    }
}
