use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ValidationError, check_not_empty, check_unit_interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSource {
    Kalshi,
    Polymarket,
    Manual,
}

/// One venue's quote for one song. `midpoint` is the implied probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    pub song_id: String,
    #[serde(default)]
    pub song: String,
    pub midpoint: f64,
    #[serde(default)]
    pub yes_bid: Option<f64>,
    #[serde(default)]
    pub yes_ask: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    pub source: MarketSource,
}

impl MarketPrice {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let entity = format!("market price {}", self.song_id);
        check_not_empty(&entity, "songId", &self.song_id)?;
        check_unit_interval(&entity, "midpoint", self.midpoint)?;
        for (field, value) in [
            ("yesBid", self.yes_bid),
            ("yesAsk", self.yes_ask),
            ("lastPrice", self.last_price),
        ] {
            if let Some(v) = value {
                check_unit_interval(&entity, field, v)?;
            }
        }
        Ok(())
    }
}

/// Static price snapshot used when live venues are unavailable.
pub fn load_prices(path: &Path) -> Result<Vec<MarketPrice>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read market prices {}", path.display()))?;
    let prices: Vec<MarketPrice> =
        serde_json::from_str(&raw).context("invalid market price json")?;
    for p in &prices {
        p.validate()?;
    }
    Ok(prices)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub external: String,
    pub song_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Bidirectional venue key <-> song id mapping. Unmapped venue keys fall
/// through as a slug of the key.
#[derive(Debug, Clone, Default)]
pub struct VenueMapping {
    to_song: HashMap<String, usize>,
    to_external: HashMap<String, usize>,
    entries: Vec<MappingEntry>,
}

impl VenueMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Result<Self, ValidationError> {
        let mut to_song = HashMap::new();
        let mut to_external = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            check_not_empty("venue mapping", "external", &entry.external)?;
            check_not_empty("venue mapping", "songId", &entry.song_id)?;
            if to_song.insert(entry.external.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateMapping(entry.external.clone()));
            }
            if to_external.insert(entry.song_id.clone(), idx).is_some() {
                return Err(ValidationError::DuplicateMapping(entry.song_id.clone()));
            }
        }
        Ok(Self {
            to_song,
            to_external,
            entries,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read venue mapping {}", path.display()))?;
        let entries: Vec<MappingEntry> =
            serde_json::from_str(&raw).context("invalid venue mapping json")?;
        Ok(Self::new(entries)?)
    }

    pub fn song_id(&self, external: &str) -> String {
        match self.to_song.get(external) {
            Some(idx) => self.entries[*idx].song_id.clone(),
            None => slugify(external),
        }
    }

    pub fn external_key(&self, song_id: &str) -> Option<&str> {
        self.to_external
            .get(song_id)
            .map(|idx| self.entries[*idx].external.as_str())
    }

    pub fn display_name(&self, external: &str) -> String {
        self.to_song
            .get(external)
            .and_then(|idx| self.entries[*idx].name.clone())
            .unwrap_or_else(|| external.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase ASCII slug: accents folded, runs of other characters become a
/// single `-`.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars().flat_map(char::to_lowercase) {
        let ch = fold_accent(ch);
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct KalshiMarketsResponse {
    #[serde(default)]
    markets: Vec<KalshiMarket>,
}

#[derive(Debug, Deserialize)]
struct KalshiMarket {
    ticker: String,
    #[serde(default)]
    yes_bid: f64,
    #[serde(default)]
    yes_ask: f64,
    #[serde(default)]
    last_price: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

/// Kalshi quotes are in cents; the song key is the last ticker segment.
pub fn parse_kalshi_markets_json(raw: &str, mapping: &VenueMapping) -> Result<Vec<MarketPrice>> {
    let parsed: KalshiMarketsResponse = serde_json::from_str(raw).context("invalid kalshi json")?;
    let prices: Vec<MarketPrice> = parsed
        .markets
        .into_iter()
        .filter_map(|m| {
            let suffix = m.ticker.rsplit('-').next().unwrap_or_default().trim();
            if suffix.is_empty() {
                return None;
            }
            let yes_bid = (m.yes_bid / 100.0).clamp(0.0, 1.0);
            let yes_ask = (m.yes_ask / 100.0).clamp(0.0, 1.0);
            Some(MarketPrice {
                song_id: mapping.song_id(suffix),
                song: mapping.display_name(suffix),
                midpoint: (yes_bid + yes_ask) / 2.0,
                yes_bid: Some(yes_bid),
                yes_ask: Some(yes_ask),
                last_price: m.last_price.map(|p| (p / 100.0).clamp(0.0, 1.0)),
                volume: m.volume,
                source: MarketSource::Kalshi,
            })
        })
        .collect();
    debug!(markets = prices.len(), "parsed kalshi markets");
    Ok(prices)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    question: String,
    #[serde(default)]
    outcome_prices: Option<String>,
    #[serde(default)]
    volume: Option<serde_json::Value>,
    #[serde(default)]
    active: bool,
}

/// Gamma returns a list of events; only the first is read. Inactive,
/// unpriced and zero-priced markets are dropped.
pub fn parse_polymarket_event_json(raw: &str, mapping: &VenueMapping) -> Result<Vec<MarketPrice>> {
    let events: Vec<GammaEvent> = serde_json::from_str(raw).context("invalid polymarket json")?;
    let Some(event) = events.into_iter().next() else {
        return Ok(Vec::new());
    };

    let prices: Vec<MarketPrice> = event
        .markets
        .into_iter()
        .filter(|m| m.active)
        .filter_map(|m| {
            let yes = m.outcome_prices.as_deref().and_then(first_outcome_price)?;
            if !(yes > 0.0 && yes <= 1.0) {
                return None;
            }
            let name = extract_song_name(&m.question);
            Some(MarketPrice {
                song_id: mapping.song_id(name),
                song: mapping.display_name(name),
                midpoint: yes,
                yes_bid: Some(yes),
                yes_ask: Some(yes),
                last_price: None,
                volume: m.volume.as_ref().and_then(value_as_f64),
                source: MarketSource::Polymarket,
            })
        })
        .collect();
    debug!(markets = prices.len(), "parsed polymarket markets");
    Ok(prices)
}

/// "Will X be played first at ..." -> "X"; other titles pass through.
pub fn extract_song_name(question: &str) -> &str {
    let q = question.trim();
    let Some(rest) = q
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("will "))
        .map(|_| &q[5..])
    else {
        return q;
    };
    let lower = rest.to_ascii_lowercase();
    match lower.find(" be played first") {
        Some(end) => rest[..end].trim(),
        None => q,
    }
}

// `outcomePrices` is a JSON array encoded as a string, e.g. "[\"0.45\", \"0.55\"]".
fn first_outcome_price(raw: &str) -> Option<f64> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw).ok()?;
    values.first().and_then(value_as_f64)
}

fn value_as_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> VenueMapping {
        VenueMapping::new(vec![
            MappingEntry {
                external: "TIT".to_string(),
                song_id: "titi-me-pregunto".to_string(),
                name: Some("Tití Me Preguntó".to_string()),
            },
            MappingEntry {
                external: "BAI".to_string(),
                song_id: "baile-inolvidable".to_string(),
                name: None,
            },
        ])
        .unwrap()
    }

    #[test]
    fn slugify_folds_accents_and_separators() {
        assert_eq!(slugify("Tití Me Preguntó"), "titi-me-pregunto");
        assert_eq!(slugify("  Te Boté - Remix "), "te-bote-remix");
        assert_eq!(slugify("un x100to"), "un-x100to");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn mapping_is_bidirectional_with_slug_fallback() {
        let m = mapping();
        assert_eq!(m.song_id("TIT"), "titi-me-pregunto");
        assert_eq!(m.external_key("titi-me-pregunto"), Some("TIT"));
        assert_eq!(m.song_id("Neverita"), "neverita");
        assert_eq!(m.external_key("neverita"), None);
        assert_eq!(m.display_name("TIT"), "Tití Me Preguntó");
        assert_eq!(m.display_name("BAI"), "BAI");
    }

    #[test]
    fn mapping_rejects_duplicates_on_either_side() {
        let dup_song = VenueMapping::new(vec![
            MappingEntry {
                external: "A".to_string(),
                song_id: "x".to_string(),
                name: None,
            },
            MappingEntry {
                external: "B".to_string(),
                song_id: "x".to_string(),
                name: None,
            },
        ]);
        assert_eq!(
            dup_song.unwrap_err(),
            ValidationError::DuplicateMapping("x".to_string())
        );
    }

    #[test]
    fn extracts_song_from_question() {
        assert_eq!(
            extract_song_name("Will DtMF be played first at the Super Bowl halftime show?"),
            "DtMF"
        );
        assert_eq!(
            extract_song_name("will La Santa BE PLAYED FIRST?"),
            "La Santa"
        );
        assert_eq!(
            extract_song_name("Halftime opener: Efecto"),
            "Halftime opener: Efecto"
        );
    }

    #[test]
    fn parses_kalshi_cents() {
        let raw = r#"{"markets":[
            {"ticker":"KXFIRSTSONG-26FEB09-TIT","yes_bid":41,"yes_ask":42,"last_price":41,"volume":1200},
            {"ticker":"KXFIRSTSONG-26FEB09-SAF","yes_bid":2,"yes_ask":4}
        ]}"#;
        let prices = parse_kalshi_markets_json(raw, &mapping()).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].song_id, "titi-me-pregunto");
        assert!((prices[0].midpoint - 0.415).abs() < 1e-12);
        assert_eq!(prices[0].source, MarketSource::Kalshi);
        assert_eq!(prices[1].song_id, "saf");
        assert!((prices[1].midpoint - 0.03).abs() < 1e-12);
    }

    #[test]
    fn parses_polymarket_string_prices() {
        let raw = r#"[{"markets":[
            {"question":"Will Neverita be played first at the Super Bowl halftime show?",
             "outcomePrices":"[\"0.07\", \"0.93\"]","volume":"1534.2","active":true},
            {"question":"Will MIA be played first at the Super Bowl halftime show?",
             "outcomePrices":"[\"0\", \"1\"]","active":true},
            {"question":"Will Safaera be played first at the Super Bowl halftime show?",
             "outcomePrices":"[\"0.2\", \"0.8\"]","active":false},
            {"question":"Will Callaita be played first at the Super Bowl halftime show?",
             "outcomePrices":"not json","active":true}
        ]}]"#;
        let prices = parse_polymarket_event_json(raw, &VenueMapping::default()).unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].song_id, "neverita");
        assert_eq!(prices[0].volume, Some(1534.2));
        assert_eq!(prices[0].source, MarketSource::Polymarket);
    }

    #[test]
    fn empty_polymarket_response_is_empty() {
        assert!(
            parse_polymarket_event_json("[]", &VenueMapping::default())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn price_validation_rejects_out_of_range_midpoint() {
        let p = MarketPrice {
            song_id: "x".to_string(),
            song: String::new(),
            midpoint: 1.2,
            yes_bid: None,
            yes_ask: None,
            last_price: None,
            volume: None,
            source: MarketSource::Manual,
        };
        assert!(p.validate().is_err());
    }
}
