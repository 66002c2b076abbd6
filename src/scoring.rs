use serde::Serialize;

use crate::catalog::{Catalog, Song};
use crate::features::{DerivedFeatures, derive_features};
use crate::model_config::{FeatureKind, ModelConfig, PenaltyRule};

/// One triggered feature and what it contributed to the log-odds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub feature: FeatureKind,
    pub likelihood_ratio: f64,
    pub log_odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub song_id: String,
    pub evidence: Vec<Evidence>,
    pub log_odds: f64,
    pub raw_odds: f64,
    pub recency_bonus: f64,
    pub penalty: Option<PenaltyRule>,
    pub score: f64,
}

pub fn score_song(song: &Song, catalog: &Catalog, cfg: &ModelConfig) -> f64 {
    score_breakdown(song, &derive_features(song, catalog), cfg).score
}

/// Naive-Bayes log-odds accumulation over the triggered features, scaled by
/// recency and at most one penalty.
pub fn score_breakdown(
    song: &Song,
    features: &DerivedFeatures,
    cfg: &ModelConfig,
) -> ScoreBreakdown {
    let evidence: Vec<Evidence> = FeatureKind::ALL
        .into_iter()
        .filter(|kind| cfg.feature_applies(*kind, song))
        .map(|feature| {
            let likelihood_ratio = cfg.effective_ratio(feature);
            Evidence {
                feature,
                likelihood_ratio,
                log_odds: likelihood_ratio.ln(),
            }
        })
        .collect();

    let log_odds: f64 = evidence.iter().map(|e| e.log_odds).sum();
    let raw_odds = log_odds.exp();
    let penalty = cfg.first_penalty(song);
    let factor = penalty.map(|p| p.factor).unwrap_or(1.0);
    let score = (raw_odds * features.recency_bonus * factor).max(0.0);

    ScoreBreakdown {
        song_id: song.id.clone(),
        evidence,
        log_odds,
        raw_odds,
        recency_bonus: features.recency_bonus,
        penalty,
        score,
    }
}
