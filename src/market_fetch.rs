use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::http_client::http_client;
use crate::market::{
    MarketPrice, MarketSource, VenueMapping, parse_kalshi_markets_json, parse_polymarket_event_json,
};

const DEFAULT_KALSHI_API_BASE: &str = "https://api.elections.kalshi.com/trade-api/v2";
const DEFAULT_KALSHI_EVENT_TICKER: &str = "KXFIRSTSUPERBOWLSONG-26FEB09";
const DEFAULT_POLYMARKET_API_BASE: &str = "https://gamma-api.polymarket.com";
const DEFAULT_POLYMARKET_EVENT_SLUG: &str = "first-song-at-super-bowl-lx-halftime-show";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct MarketFetchConfig {
    pub live: bool,
    pub kalshi_api_base: String,
    pub kalshi_event_ticker: String,
    pub polymarket_api_base: String,
    pub polymarket_event_slug: String,
    pub timeout: Duration,
}

impl MarketFetchConfig {
    pub fn from_env() -> Self {
        let timeout_secs = env::var("MARKET_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 120);
        Self {
            live: env_bool("MARKETS_LIVE", false),
            kalshi_api_base: env_or("KALSHI_API_BASE", DEFAULT_KALSHI_API_BASE),
            kalshi_event_ticker: env_or("KALSHI_EVENT_TICKER", DEFAULT_KALSHI_EVENT_TICKER),
            polymarket_api_base: env_or("POLYMARKET_API_BASE", DEFAULT_POLYMARKET_API_BASE),
            polymarket_event_slug: env_or("POLYMARKET_EVENT_SLUG", DEFAULT_POLYMARKET_EVENT_SLUG),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Prices for one venue and whether they came from the static snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueQuotes {
    pub source: MarketSource,
    pub fallback: bool,
    pub prices: Vec<MarketPrice>,
}

pub fn fetch_kalshi_prices(
    cfg: &MarketFetchConfig,
    mapping: &VenueMapping,
) -> Result<Vec<MarketPrice>> {
    let url = format!("{}/markets", cfg.kalshi_api_base.trim_end_matches('/'));
    let body = get_text(
        &url,
        &[
            ("event_ticker", cfg.kalshi_event_ticker.as_str()),
            ("limit", "100"),
        ],
        cfg.timeout,
    )
    .context("kalshi request failed")?;
    parse_kalshi_markets_json(&body, mapping)
}

pub fn fetch_polymarket_prices(
    cfg: &MarketFetchConfig,
    mapping: &VenueMapping,
) -> Result<Vec<MarketPrice>> {
    let url = format!("{}/events", cfg.polymarket_api_base.trim_end_matches('/'));
    let body = get_text(
        &url,
        &[("slug", cfg.polymarket_event_slug.as_str())],
        cfg.timeout,
    )
    .context("polymarket request failed")?;
    parse_polymarket_event_json(&body, mapping)
}

/// Runs `fetch`; any error (or an empty result) yields the snapshot instead,
/// flagged as a fallback.
pub fn fetch_or_fallback(
    source: MarketSource,
    snapshot: &[MarketPrice],
    fetch: impl FnOnce() -> Result<Vec<MarketPrice>>,
) -> VenueQuotes {
    match fetch() {
        Ok(prices) if !prices.is_empty() => {
            info!(?source, markets = prices.len(), "live market prices");
            VenueQuotes {
                source,
                fallback: false,
                prices,
            }
        }
        Ok(_) => {
            warn!(?source, "venue returned no markets, using snapshot");
            fallback(source, snapshot)
        }
        Err(err) => {
            warn!(?source, error = %format!("{err:#}"), "market fetch failed, using snapshot");
            fallback(source, snapshot)
        }
    }
}

/// Venues averaged by the edge calculator. A Kalshi fallback stands in for
/// Kalshi next to live Polymarket; a Polymarket fallback is dropped whenever
/// Kalshi already carries prices, so the snapshot is never counted twice.
pub fn select_venues(kalshi: VenueQuotes, poly: VenueQuotes) -> Vec<VenueQuotes> {
    if poly.fallback {
        vec![kalshi]
    } else {
        vec![kalshi, poly]
    }
}

fn fallback(source: MarketSource, snapshot: &[MarketPrice]) -> VenueQuotes {
    VenueQuotes {
        source,
        fallback: true,
        prices: snapshot.to_vec(),
    }
}

fn get_text(url: &str, query: &[(&str, &str)], timeout: Duration) -> Result<String> {
    let client = http_client(timeout)?;
    let resp = client.get(url).query(query).send()?;
    let status = resp.status();
    let body = resp.text().context("failed reading response body")?;
    if !status.is_success() {
        let snippet = body
            .trim()
            .replace(['\n', '\r'], " ")
            .chars()
            .take(220)
            .collect::<String>();
        return Err(anyhow::anyhow!("http {}: {}", status, snippet));
    }
    Ok(body)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
