use std::fs;
use std::path::PathBuf;

use halftime_edge::catalog::Catalog;
use halftime_edge::edge::{Signal, calculate_edge};
use halftime_edge::market::{
    MarketPrice, MarketSource, VenueMapping, load_prices, parse_kalshi_markets_json,
    parse_polymarket_event_json,
};
use halftime_edge::model_config::ModelConfig;
use halftime_edge::predictions::generate_predictions;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

fn kalshi_prices() -> Vec<MarketPrice> {
    let mapping = VenueMapping::load(&fixture_path("kalshi_mapping.json")).unwrap();
    parse_kalshi_markets_json(&read_fixture("kalshi_markets.json"), &mapping).unwrap()
}

fn polymarket_prices() -> Vec<MarketPrice> {
    let mapping = VenueMapping::load(&fixture_path("polymarket_mapping.json")).unwrap();
    parse_polymarket_event_json(&read_fixture("polymarket_event.json"), &mapping).unwrap()
}

#[test]
fn parses_kalshi_fixture() {
    let prices = kalshi_prices();
    assert_eq!(prices.len(), 4);
    assert_eq!(prices[0].song_id, "neon-tide");
    assert_eq!(prices[0].song, "Neon Tide");
    assert!((prices[0].midpoint - 0.37).abs() < 1e-12);
    assert_eq!(prices[0].last_price, Some(0.37));
    assert_eq!(prices[0].volume, Some(48210.0));
    // Unmapped suffix falls back to its slug.
    assert_eq!(prices[3].song_id, "lan");
    assert!(prices.iter().all(|p| p.source == MarketSource::Kalshi));
}

#[test]
fn parses_polymarket_fixture_skipping_inactive_and_zero() {
    let prices = polymarket_prices();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0].song_id, "neon-tide");
    assert_eq!(prices[0].song, "Neon Tide");
    assert!((prices[0].midpoint - 0.41).abs() < 1e-12);
    assert_eq!(prices[0].volume, Some(125000.5));
    assert_eq!(prices[1].song_id, "salt-and-static");
    assert_eq!(prices[1].song, "Salt & Static");
    assert_eq!(prices[1].volume, Some(40210.0));
}

#[test]
fn edges_average_venues_that_quote_the_song() {
    let catalog = Catalog::load(&fixture_path("catalog.json")).unwrap();
    let predictions = generate_predictions(&catalog, &ModelConfig::dampened());
    let kalshi = kalshi_prices();
    let poly = polymarket_prices();
    let edges = calculate_edge(&predictions, &[&kalshi[..], &poly[..]]);
    assert_eq!(edges.len(), predictions.len());

    let find = |id: &str| edges.iter().find(|e| e.song_id == id).unwrap();

    let neon = find("neon-tide");
    assert_eq!(neon.venues.len(), 2);
    assert!((neon.market_probability - 0.39).abs() < 1e-9);
    assert!((neon.edge - (neon.our_probability - 0.39)).abs() < 1e-12);
    assert_eq!(neon.signal, Signal::StrongAvoid);

    let salt = find("salt-and-static");
    assert!((salt.market_probability - 0.12).abs() < 1e-9);
    assert_eq!(salt.signal, Signal::Buy);

    let gold = find("gold-rush");
    assert_eq!(gold.venues.len(), 1);
    assert_eq!(gold.venues[0].source, MarketSource::Kalshi);
    assert!((gold.market_probability - 0.25).abs() < 1e-9);
}

#[test]
fn unquoted_song_is_measured_against_zero() {
    let catalog = Catalog::load(&fixture_path("catalog.json")).unwrap();
    let predictions = generate_predictions(&catalog, &ModelConfig::dampened());
    let kalshi = kalshi_prices();
    let edges = calculate_edge(&predictions, &[&kalshi[..]]);

    let parade = edges
        .iter()
        .find(|e| e.song_id == "midnight-parade")
        .unwrap();
    assert!(!parade.has_market_coverage());
    assert_eq!(parade.market_probability, 0.0);
    assert_eq!(parade.edge, parade.our_probability);
    assert_eq!(parade.signal, Signal::StrongBuy);
    assert!(parade.venues.is_empty());
}

#[test]
fn snapshot_fixture_loads_and_validates() {
    let prices = load_prices(&fixture_path("market_snapshot.json")).unwrap();
    assert_eq!(prices.len(), 7);
    assert!(prices.iter().all(|p| p.source == MarketSource::Manual));
    assert!(prices.iter().all(|p| p.validate().is_ok()));
}
