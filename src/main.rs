use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use halftime_edge::catalog::Catalog;
use halftime_edge::cli::{self, env_path, has_flag, parse_str_arg, positional_arg};
use halftime_edge::edge::{EdgeAnalysis, calculate_edge};
use halftime_edge::market::{MarketPrice, MarketSource, VenueMapping, load_prices};
use halftime_edge::market_fetch::{
    MarketFetchConfig, VenueQuotes, fetch_kalshi_prices, fetch_or_fallback,
    fetch_polymarket_prices, select_venues,
};
use halftime_edge::model_config::ModelConfig;
use halftime_edge::predictions::{Prediction, generate_predictions};

const DEFAULT_CATALOG: &str = "tests/fixtures/catalog.json";
const DEFAULT_SNAPSHOT: &str = "tests/fixtures/market_snapshot.json";
const DEFAULT_KALSHI_MAPPING: &str = "tests/fixtures/kalshi_mapping.json";
const DEFAULT_POLYMARKET_MAPPING: &str = "tests/fixtures/polymarket_mapping.json";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    model_version: &'a str,
    predictions: &'a [Prediction],
    edges: &'a [EdgeAnalysis],
    venues: &'a [VenueQuotes],
    last_updated: String,
}

fn main() -> Result<()> {
    cli::init();
    let args = cli::args();

    let cfg = match parse_str_arg(&args, "--model") {
        Some(name) => ModelConfig::builtin(&name)
            .with_context(|| format!("unknown --model {name}, expected dampened or raw"))?,
        None => ModelConfig::from_env()?,
    };
    cfg.validate()?;

    let catalog_path = positional_arg(&args, &["--model"])
        .or_else(|| env_path("CATALOG_PATH"))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG));
    let catalog = Catalog::load(&catalog_path)?;
    info!(songs = catalog.len(), model = %cfg.version, "scoring catalog");

    let predictions = generate_predictions(&catalog, &cfg);

    let snapshot_path =
        env_path("MARKET_SNAPSHOT_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT));
    let snapshot = load_prices(&snapshot_path)?;

    let mut fetch_cfg = MarketFetchConfig::from_env();
    fetch_cfg.live |= has_flag(&args, "--live");
    let venues = load_venues(&fetch_cfg, &snapshot)?;

    let sources: Vec<&[MarketPrice]> = venues.iter().map(|v| v.prices.as_slice()).collect();
    let edges = calculate_edge(&predictions, &sources);

    if has_flag(&args, "--json") {
        let report = Report {
            model_version: &cfg.version,
            predictions: &predictions,
            edges: &edges,
            venues: &venues,
            last_updated: chrono::Utc::now().to_rfc3339(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_predictions(&predictions);
    println!();
    print_edges(&edges, &venues);
    Ok(())
}

/// Live mode queries both venues, each falling back to the snapshot on its
/// own. Otherwise the snapshot is the single source.
fn load_venues(cfg: &MarketFetchConfig, snapshot: &[MarketPrice]) -> Result<Vec<VenueQuotes>> {
    if !cfg.live {
        return Ok(vec![VenueQuotes {
            source: MarketSource::Manual,
            fallback: true,
            prices: snapshot.to_vec(),
        }]);
    }

    let kalshi_mapping = VenueMapping::load(
        &env_path("KALSHI_MAPPING_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_KALSHI_MAPPING)),
    )?;
    let poly_mapping = VenueMapping::load(
        &env_path("POLYMARKET_MAPPING_PATH")
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POLYMARKET_MAPPING)),
    )?;

    let kalshi = fetch_or_fallback(MarketSource::Kalshi, snapshot, || {
        fetch_kalshi_prices(cfg, &kalshi_mapping)
    });
    let poly = fetch_or_fallback(MarketSource::Polymarket, snapshot, || {
        fetch_polymarket_prices(cfg, &poly_mapping)
    });

    Ok(select_venues(kalshi, poly))
}

fn print_predictions(predictions: &[Prediction]) {
    println!(
        "{:<4} {:<28} {:>8} {:>8}  {}",
        "#", "SONG", "PROB", "CONF", "REASONING"
    );
    for (idx, p) in predictions.iter().enumerate() {
        println!(
            "{:<4} {:<28} {:>7.1}% {:>8}  {}",
            idx + 1,
            truncate(&p.song, 28),
            p.probability * 100.0,
            format!("{:?}", p.confidence).to_uppercase(),
            p.reasoning.join("; ")
        );
    }
}

fn print_edges(edges: &[EdgeAnalysis], venues: &[VenueQuotes]) {
    let labels = venues
        .iter()
        .map(|v| {
            let tag = format!("{:?}", v.source).to_lowercase();
            if v.fallback {
                format!("{tag} (fallback)")
            } else {
                tag
            }
        })
        .collect::<Vec<_>>();
    println!("Markets: {}", labels.join(", "));
    println!(
        "{:<28} {:>8} {:>8} {:>8}  {}",
        "SONG", "MODEL", "MARKET", "EDGE", "SIGNAL"
    );

    let mut covered: Vec<&EdgeAnalysis> =
        edges.iter().filter(|e| e.has_market_coverage()).collect();
    covered.sort_by(|a, b| b.edge.total_cmp(&a.edge));
    for e in &covered {
        println!(
            "{:<28} {:>7.1}% {:>7.1}% {:>+7.1}%  {}",
            truncate(&e.song, 28),
            e.our_probability * 100.0,
            e.market_probability * 100.0,
            e.edge * 100.0,
            e.signal.label()
        );
    }
    let unpriced = edges.len() - covered.len();
    if unpriced > 0 {
        println!("({unpriced} songs without a market quote omitted)");
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
