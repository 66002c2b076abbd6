use serde::Serialize;

use crate::catalog::{Catalog, Song};
use crate::features::derive_catalog_features;
use crate::model_config::{ConfidenceThresholds, FeatureKind, ModelConfig, PenaltyKind};
use crate::scoring::{ScoreBreakdown, score_breakdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_probability(p: f64, thresholds: &ConfidenceThresholds) -> Self {
        if p >= thresholds.high {
            Confidence::High
        } else if p >= thresholds.medium {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "kind")]
pub enum ReasonKind {
    Feature(FeatureKind),
    Penalty(PenaltyKind),
}

/// Machine-readable reason. `magnitude` is the log-odds contribution for
/// features and the multiplicative factor for penalties.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonFactor {
    pub kind: ReasonKind,
    pub magnitude: f64,
    pub evidence: String,
}

impl ReasonFactor {
    pub fn render(&self) -> String {
        match self.kind {
            ReasonKind::Feature(_) => {
                format!("{} (+{:.2} log-odds)", self.evidence, self.magnitude)
            }
            ReasonKind::Penalty(_) => format!("{} (x{:.2})", self.evidence, self.magnitude),
        }
    }
}

pub fn render_reasoning(factors: &[ReasonFactor]) -> Vec<String> {
    factors.iter().map(ReasonFactor::render).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub song_id: String,
    pub song: String,
    pub probability: f64,
    pub confidence: Confidence,
    pub raw_score: f64,
    pub compressed_score: f64,
    pub factors: Vec<ReasonFactor>,
    pub reasoning: Vec<String>,
}

/// Power-law compression; strictly increasing for positive scores.
pub fn compress_score(score: f64, exponent: f64) -> f64 {
    if score <= 0.0 {
        return 0.0;
    }
    score.powf(exponent)
}

pub fn generate_predictions(catalog: &Catalog, cfg: &ModelConfig) -> Vec<Prediction> {
    let features = derive_catalog_features(catalog);
    let scored: Vec<(&Song, ScoreBreakdown, f64)> = catalog
        .songs()
        .iter()
        .zip(&features)
        .map(|(song, f)| {
            let breakdown = score_breakdown(song, f, cfg);
            let compressed = compress_score(breakdown.score, cfg.compression_exponent);
            (song, breakdown, compressed)
        })
        .collect();

    let total: f64 = scored.iter().map(|(_, _, c)| c).sum();

    let mut out: Vec<Prediction> = scored
        .into_iter()
        .map(|(song, breakdown, compressed)| {
            let probability = if total > 0.0 { compressed / total } else { 0.0 };
            let factors = reason_factors(song, &breakdown);
            Prediction {
                song_id: song.id.clone(),
                song: song.name.clone(),
                probability,
                confidence: Confidence::from_probability(probability, &cfg.confidence),
                raw_score: breakdown.score,
                compressed_score: compressed,
                reasoning: render_reasoning(&factors),
                factors,
            }
        })
        .collect();

    // Raw score breaks probability ties left by compression rounding;
    // `sort_by` is stable, so exact ties keep catalog order.
    out.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| b.raw_score.total_cmp(&a.raw_score))
    });
    out
}

pub fn reason_factors(song: &Song, breakdown: &ScoreBreakdown) -> Vec<ReasonFactor> {
    let mut factors: Vec<ReasonFactor> = breakdown
        .evidence
        .iter()
        .map(|e| ReasonFactor {
            kind: ReasonKind::Feature(e.feature),
            magnitude: e.log_odds,
            evidence: feature_evidence(e.feature, song),
        })
        .collect();

    if let Some(rule) = breakdown.penalty {
        factors.push(ReasonFactor {
            kind: ReasonKind::Penalty(rule.kind),
            magnitude: rule.factor,
            evidence: penalty_evidence(rule.kind, song),
        });
    }
    factors
}

fn feature_evidence(kind: FeatureKind, song: &Song) -> String {
    match kind {
        FeatureKind::Trailer => "Featured in the official promo trailer".to_string(),
        FeatureKind::CurrentAlbum => "From the current album (promotional advantage)".to_string(),
        FeatureKind::TourOpener => format!("Opened {} tour shows", song.tour_opener_count),
        FeatureKind::Popularity => format!(
            "High popularity ({:.2}B streams)",
            song.total_streams as f64 / 1e9
        ),
        FeatureKind::Energy => format!("High energy score ({:.2})", song.energy_score),
        FeatureKind::Upbeat => "Upbeat tempo suits an opener".to_string(),
        FeatureKind::Solo => "Solo track (no guest logistics)".to_string(),
    }
}

fn penalty_evidence(kind: PenaltyKind, song: &Song) -> String {
    match kind {
        PenaltyKind::MegaHit => {
            "Mega-hit penalty (catalog classics are saved for later)".to_string()
        }
        PenaltyKind::TopHitSoloUpbeat => {
            "Softened top-hit penalty (older hit, but solo and upbeat)".to_string()
        }
        PenaltyKind::TopHit => "Top-hit penalty (older catalog hit)".to_string(),
        PenaltyKind::NonSolo => match song.featured_artist.as_deref() {
            Some(guest) => format!("Requires guest: {guest}"),
            None => "Requires a guest performer".to_string(),
        },
    }
}
