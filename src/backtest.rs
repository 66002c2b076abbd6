use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{Catalog, Song};
pub use crate::error::BacktestError;
use crate::error::{ValidationError, check_not_empty, check_unit_interval, check_year};
use crate::model_config::ModelConfig;
use crate::predictions::generate_predictions;

pub const DEFAULT_TOP_K: usize = 3;
pub const OUTCOME_SONG_ID: &str = "actual-outcome";

const BIGGEST_HIT_STREAMS: u64 = 2_500_000_000;
const REGULAR_STREAMS: u64 = 500_000_000;

/// A past event and the features of the song that actually opened it.
/// Every flag is required; a missing one rejects the whole input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEvent {
    pub event_id: String,
    pub year: i32,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(alias = "opener")]
    pub outcome_name: String,
    pub is_biggest_hit: bool,
    #[serde(alias = "isCurrentAlbum")]
    pub is_current_album_track: bool,
    pub is_solo: bool,
    pub is_upbeat: bool,
    pub energy_score: f64,
    #[serde(alias = "inPromo")]
    pub in_official_promo: bool,
    pub is_tour_opener: bool,
}

impl HistoricalEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let entity = format!("event {}", self.event_id);
        check_not_empty(&entity, "eventId", &self.event_id)?;
        check_not_empty(&entity, "outcomeName", &self.outcome_name)?;
        check_year(&entity, "year", self.year)?;
        check_unit_interval(&entity, "energyScore", self.energy_score)?;
        Ok(())
    }
}

/// Accepts a bare array of events or `{ "shows": [...] }`.
pub fn parse_historical_events_json(raw: &str) -> Result<Vec<HistoricalEvent>, BacktestError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let records = match value {
        serde_json::Value::Object(mut obj) if obj.contains_key("shows") => {
            obj.remove("shows").unwrap_or_default()
        }
        other => other,
    };
    let events: Vec<HistoricalEvent> = serde_json::from_value(records)?;
    validate_events(&events)?;
    Ok(events)
}

pub fn load_historical_events(path: &Path) -> Result<Vec<HistoricalEvent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read historical events {}", path.display()))?;
    parse_historical_events_json(&raw)
        .with_context(|| format!("load historical events {}", path.display()))
}

fn validate_events(events: &[HistoricalEvent]) -> Result<(), BacktestError> {
    for event in events {
        event
            .validate()
            .map_err(|source| BacktestError::InvalidEvent {
                event_id: event.event_id.clone(),
                source,
            })?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub event_id: String,
    pub year: i32,
    pub artist: Option<String>,
    pub outcome_name: String,
    /// 1-based position of the real outcome, sorted by descending probability.
    pub rank: usize,
    pub total_candidates: usize,
    pub top_k: usize,
    pub in_top_k: bool,
    pub probability: f64,
    pub top_song_id: String,
    pub top_song_name: String,
    pub top_probability: f64,
    /// Multi-class Brier score of the whole synthetic distribution.
    pub brier: f64,
}

pub fn run_backtest(
    events: &[HistoricalEvent],
    cfg: &ModelConfig,
    top_k: usize,
) -> Result<Vec<BacktestResult>, BacktestError> {
    validate_events(events)?;
    let top_k = top_k.max(1);
    info!(events = events.len(), top_k, model = %cfg.version, "running backtest");

    // `collect` keeps input order, so parallel runs stay deterministic.
    events
        .par_iter()
        .map(|event| evaluate_event(event, cfg, top_k))
        .collect()
}

fn evaluate_event(
    event: &HistoricalEvent,
    cfg: &ModelConfig,
    top_k: usize,
) -> Result<BacktestResult, BacktestError> {
    let catalog = synthetic_catalog(event).map_err(|source| BacktestError::SyntheticCatalog {
        event_id: event.event_id.clone(),
        source,
    })?;
    let predictions = generate_predictions(&catalog, cfg);

    let outcome_idx = predictions
        .iter()
        .position(|p| p.song_id == OUTCOME_SONG_ID)
        .unwrap_or(predictions.len());
    let probability = predictions
        .get(outcome_idx)
        .map(|p| p.probability)
        .unwrap_or(0.0);
    let rank = outcome_idx + 1;

    let brier: f64 = predictions
        .iter()
        .map(|p| {
            let y = if p.song_id == OUTCOME_SONG_ID {
                1.0
            } else {
                0.0
            };
            (p.probability - y).powi(2)
        })
        .sum();

    let (top_song_id, top_song_name, top_probability) = predictions
        .first()
        .map(|p| (p.song_id.clone(), p.song.clone(), p.probability))
        .unwrap_or_default();

    debug!(event = %event.event_id, rank, probability, "backtest event scored");

    Ok(BacktestResult {
        event_id: event.event_id.clone(),
        year: event.year,
        artist: event.artist.clone(),
        outcome_name: event.outcome_name.clone(),
        rank,
        total_candidates: catalog.len(),
        top_k,
        in_top_k: rank <= top_k,
        probability,
        top_song_id,
        top_song_name,
        top_probability,
        brier,
    })
}

/// The real outcome followed by the five fixed archetypes. Archetype
/// features never depend on the event beyond its year.
pub fn synthetic_catalog(event: &HistoricalEvent) -> Result<Catalog, ValidationError> {
    let year = event.year;
    let mut songs = vec![Song {
        id: OUTCOME_SONG_ID.to_string(),
        name: event.outcome_name.clone(),
        album: if event.is_current_album_track {
            "Current".to_string()
        } else {
            "Older".to_string()
        },
        album_year: if event.is_current_album_track {
            year
        } else {
            year.saturating_sub(3)
        },
        total_streams: if event.is_biggest_hit {
            BIGGEST_HIT_STREAMS
        } else {
            REGULAR_STREAMS
        },
        daily_streams: 500_000,
        is_solo: event.is_solo,
        featured_artist: (!event.is_solo).then(|| "Guest Artist".to_string()),
        is_upbeat: event.is_upbeat,
        energy_score: event.energy_score,
        in_official_trailer: event.in_official_promo,
        is_from_current_album: event.is_current_album_track,
        tour_opener_count: if event.is_tour_opener { 5 } else { 0 },
        tour_play_count: 10,
        bpm_estimate: None,
        notes: String::new(),
    }];
    songs.extend(Archetype::ALL.iter().map(|a| a.song(year)));
    Ok(Catalog::new(songs)?.with_reference_year(year))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    OldMegaHit,
    GuestCollab,
    SlowBallad,
    CurrentDeepCut,
    MidTierUpbeat,
}

struct ArchetypeProfile {
    id: &'static str,
    name: &'static str,
    album: &'static str,
    age: i32,
    total_streams: u64,
    daily_streams: u64,
    guest: Option<&'static str>,
    is_upbeat: bool,
    energy_score: f64,
    is_from_current_album: bool,
    tour_play_count: u32,
    bpm: u32,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::OldMegaHit,
        Archetype::GuestCollab,
        Archetype::SlowBallad,
        Archetype::CurrentDeepCut,
        Archetype::MidTierUpbeat,
    ];

    pub fn id(self) -> &'static str {
        self.profile().id
    }

    fn profile(self) -> ArchetypeProfile {
        match self {
            Archetype::OldMegaHit => ArchetypeProfile {
                id: "biggest-hit",
                name: "Biggest Hit",
                album: "Classic",
                age: 5,
                total_streams: 2_500_000_000,
                daily_streams: 800_000,
                guest: None,
                is_upbeat: true,
                energy_score: 0.80,
                is_from_current_album: false,
                tour_play_count: 15,
                bpm: 120,
            },
            Archetype::GuestCollab => ArchetypeProfile {
                id: "popular-collab",
                name: "Popular Collab",
                album: "Previous",
                age: 2,
                total_streams: 1_800_000_000,
                daily_streams: 600_000,
                guest: Some("Famous Artist"),
                is_upbeat: true,
                energy_score: 0.75,
                is_from_current_album: false,
                tour_play_count: 12,
                bpm: 110,
            },
            Archetype::SlowBallad => ArchetypeProfile {
                id: "ballad",
                name: "Big Ballad",
                album: "Previous",
                age: 3,
                total_streams: 1_200_000_000,
                daily_streams: 400_000,
                guest: None,
                is_upbeat: false,
                energy_score: 0.40,
                is_from_current_album: false,
                tour_play_count: 8,
                bpm: 80,
            },
            Archetype::CurrentDeepCut => ArchetypeProfile {
                id: "current-deep-cut",
                name: "Current Album B-Side",
                album: "Current",
                age: 0,
                total_streams: 300_000_000,
                daily_streams: 200_000,
                guest: None,
                is_upbeat: false,
                energy_score: 0.55,
                is_from_current_album: true,
                tour_play_count: 5,
                bpm: 100,
            },
            Archetype::MidTierUpbeat => ArchetypeProfile {
                id: "mid-upbeat",
                name: "Mid Upbeat Track",
                album: "Previous",
                age: 2,
                total_streams: 700_000_000,
                daily_streams: 300_000,
                guest: None,
                is_upbeat: true,
                energy_score: 0.82,
                is_from_current_album: false,
                tour_play_count: 10,
                bpm: 125,
            },
        }
    }

    pub fn song(self, event_year: i32) -> Song {
        let p = self.profile();
        Song {
            id: p.id.to_string(),
            name: p.name.to_string(),
            album: p.album.to_string(),
            album_year: event_year.saturating_sub(p.age),
            total_streams: p.total_streams,
            daily_streams: p.daily_streams,
            is_solo: p.guest.is_none(),
            featured_artist: p.guest.map(str::to_string),
            is_upbeat: p.is_upbeat,
            energy_score: p.energy_score,
            in_official_trailer: false,
            is_from_current_album: p.is_from_current_album,
            tour_opener_count: 0,
            tour_play_count: p.tour_play_count,
            bpm_estimate: Some(p.bpm),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestSummary {
    pub samples: usize,
    pub top_k: usize,
    pub rank_one_hits: usize,
    pub top_k_hits: usize,
    pub top_k_rate: f64,
    pub mean_rank: f64,
    pub mean_probability: f64,
    pub log_loss: f64,
    /// Log loss of a uniform guess over the same candidate counts.
    pub uniform_log_loss: f64,
    pub brier: f64,
}

pub fn summarize(results: &[BacktestResult]) -> BacktestSummary {
    let top_k = results.first().map(|r| r.top_k).unwrap_or(DEFAULT_TOP_K);
    if results.is_empty() {
        return BacktestSummary {
            samples: 0,
            top_k,
            rank_one_hits: 0,
            top_k_hits: 0,
            top_k_rate: 0.0,
            mean_rank: 0.0,
            mean_probability: 0.0,
            log_loss: 0.0,
            uniform_log_loss: 0.0,
            brier: 0.0,
        };
    }

    let n = results.len() as f64;
    let top_k_hits = results.iter().filter(|r| r.in_top_k).count();

    BacktestSummary {
        samples: results.len(),
        top_k,
        rank_one_hits: results.iter().filter(|r| r.rank == 1).count(),
        top_k_hits,
        top_k_rate: top_k_hits as f64 / n,
        mean_rank: mean_of(results, |r| r.rank as f64),
        mean_probability: mean_of(results, |r| r.probability),
        log_loss: mean_of(results, |r| -r.probability.clamp(1e-12, 1.0).ln()),
        uniform_log_loss: mean_of(results, |r| (r.total_candidates.max(1) as f64).ln()),
        brier: mean_of(results, |r| r.brier),
    }
}

fn mean_of(results: &[BacktestResult], f: impl Fn(&BacktestResult) -> f64) -> f64 {
    results.iter().map(f).sum::<f64>() / results.len() as f64
}
