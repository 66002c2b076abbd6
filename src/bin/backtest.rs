use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use halftime_edge::backtest::{
    self, BacktestResult, BacktestSummary, DEFAULT_TOP_K, load_historical_events,
};
use halftime_edge::cli::{self, has_flag, parse_str_arg, parse_usize_arg, positional_arg};
use halftime_edge::model_config::ModelConfig;

const DEFAULT_EVENTS: &str = "tests/fixtures/historical_events.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    model_version: &'a str,
    summary: BacktestSummary,
    results: &'a [BacktestResult],
}

fn main() -> Result<()> {
    cli::init();
    let args = cli::args();

    let path = positional_arg(&args, &["--top-k", "--model"])
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS));

    let top_k = parse_usize_arg(&args, "--top-k")
        .or_else(|| {
            std::env::var("BACKTEST_TOP_K")
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(DEFAULT_TOP_K)
        .max(1);

    let cfg = match parse_str_arg(&args, "--model") {
        Some(name) => ModelConfig::builtin(&name)
            .with_context(|| format!("unknown --model {name}, expected dampened or raw"))?,
        None => ModelConfig::from_env()?,
    };

    // Fails on the first malformed record rather than skipping it.
    let events = load_historical_events(&path)?;
    let results = backtest::run_backtest(&events, &cfg, top_k)?;
    let summary = backtest::summarize(&results);

    if has_flag(&args, "--json") {
        let report = Report {
            model_version: &cfg.version,
            summary,
            results: &results,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<26} {:>5} {:>7} {:<22} {:>6}",
        "YEAR",
        "ARTIST",
        "ACTUAL",
        "RANK",
        "PROB",
        "TOP PICK",
        format!("TOP{top_k}")
    );
    for r in &results {
        println!(
            "{:<6} {:<20} {:<26} {:>5} {:>6.1}% {:<22} {:>6}",
            r.year,
            r.artist.as_deref().unwrap_or("-"),
            r.outcome_name,
            format!("#{}", r.rank),
            r.probability * 100.0,
            r.top_song_name,
            if r.in_top_k { "YES" } else { "NO" }
        );
    }

    println!();
    println!("Model: {}", cfg.version);
    println!(
        "Top-{}: {}/{} ({:.0}%)   Ranked #1: {}/{}   Mean rank: {:.2}",
        summary.top_k,
        summary.top_k_hits,
        summary.samples,
        summary.top_k_rate * 100.0,
        summary.rank_one_hits,
        summary.samples,
        summary.mean_rank
    );
    println!(
        "Log loss: {:.4} (uniform {:.4})   Brier: {:.4}   Mean p(actual): {:.1}%",
        summary.log_loss,
        summary.uniform_log_loss,
        summary.brier,
        summary.mean_probability * 100.0
    );

    Ok(())
}
