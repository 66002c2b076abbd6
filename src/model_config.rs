use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::Song;
use crate::error::ValidationError;

pub const DAMPENED_VERSION: &str = "2.2-dampened";
pub const RAW_VERSION: &str = "2.2-raw";

/// Evidence features, in the order reasons are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Trailer,
    CurrentAlbum,
    TourOpener,
    Popularity,
    Energy,
    Upbeat,
    Solo,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 7] = [
        FeatureKind::Trailer,
        FeatureKind::CurrentAlbum,
        FeatureKind::TourOpener,
        FeatureKind::Popularity,
        FeatureKind::Energy,
        FeatureKind::Upbeat,
        FeatureKind::Solo,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PenaltyKind {
    MegaHit,
    TopHitSoloUpbeat,
    TopHit,
    NonSolo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dampening {
    Sqrt,
    None,
}

/// Frequency of a feature among known openers over its frequency in a
/// general catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikelihoodRatios {
    pub trailer: f64,
    pub current_album: f64,
    pub tour_opener: f64,
    pub popularity: f64,
    pub energy: f64,
    pub upbeat: f64,
    pub solo: f64,
}

impl LikelihoodRatios {
    pub fn get(&self, kind: FeatureKind) -> f64 {
        match kind {
            FeatureKind::Trailer => self.trailer,
            FeatureKind::CurrentAlbum => self.current_album,
            FeatureKind::TourOpener => self.tour_opener,
            FeatureKind::Popularity => self.popularity,
            FeatureKind::Energy => self.energy,
            FeatureKind::Upbeat => self.upbeat,
            FeatureKind::Solo => self.solo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRule {
    pub kind: PenaltyKind,
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub version: String,
    pub likelihood_ratios: LikelihoodRatios,
    pub dampening: Dampening,
    pub energy_threshold: f64,
    pub popularity_threshold: u64,
    pub mega_hit_threshold: u64,
    pub top_hit_threshold: u64,
    /// Evaluated in order; the first matching rule is the only one applied.
    pub penalties: Vec<PenaltyRule>,
    pub compression_exponent: f64,
    pub confidence: ConfidenceThresholds,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::dampened()
    }
}

impl ModelConfig {
    pub fn dampened() -> Self {
        Self {
            version: DAMPENED_VERSION.to_string(),
            likelihood_ratios: LikelihoodRatios {
                trailer: 3.0,
                current_album: 2.4,
                tour_opener: 2.6,
                popularity: 1.3,
                energy: 1.8,
                upbeat: 2.0,
                solo: 1.5,
            },
            dampening: Dampening::Sqrt,
            energy_threshold: 0.7,
            popularity_threshold: 1_000_000_000,
            mega_hit_threshold: 2_000_000_000,
            top_hit_threshold: 1_500_000_000,
            penalties: vec![
                PenaltyRule {
                    kind: PenaltyKind::MegaHit,
                    factor: 0.35,
                },
                PenaltyRule {
                    kind: PenaltyKind::TopHitSoloUpbeat,
                    factor: 0.80,
                },
                PenaltyRule {
                    kind: PenaltyKind::TopHit,
                    factor: 0.60,
                },
                PenaltyRule {
                    kind: PenaltyKind::NonSolo,
                    factor: 0.50,
                },
            ],
            compression_exponent: 0.6,
            confidence: ConfidenceThresholds {
                high: 0.15,
                medium: 0.05,
            },
        }
    }

    /// Same ratios without the square-root attenuation.
    pub fn raw() -> Self {
        Self {
            version: RAW_VERSION.to_string(),
            dampening: Dampening::None,
            ..Self::dampened()
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dampened" | DAMPENED_VERSION => Some(Self::dampened()),
            "raw" | RAW_VERSION => Some(Self::raw()),
            _ => None,
        }
    }

    /// `MODEL_CONFIG_PATH` wins over `MODEL_VERSION`; neither set means the
    /// dampened revision.
    pub fn from_env() -> Result<Self> {
        if let Some(path) = env::var("MODEL_CONFIG_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            return Self::load(Path::new(&path));
        }
        match env::var("MODEL_VERSION") {
            Ok(name) if !name.trim().is_empty() => Self::builtin(&name)
                .with_context(|| format!("unknown MODEL_VERSION={name}, expected dampened or raw")),
            _ => Ok(Self::dampened()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model config {}", path.display()))?;
        let cfg: ModelConfig = serde_json::from_str(&raw).context("invalid model config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidConfig {
            version: self.version.clone(),
            reason,
        };

        for kind in FeatureKind::ALL {
            let lr = self.likelihood_ratios.get(kind);
            if !(lr.is_finite() && lr > 0.0) {
                return Err(invalid(format!(
                    "likelihood ratio for {kind:?} must be > 0, got {lr}"
                )));
            }
        }
        for rule in &self.penalties {
            if !(0.0..=1.0).contains(&rule.factor) {
                return Err(invalid(format!(
                    "penalty {:?} factor must be in [0, 1], got {}",
                    rule.kind, rule.factor
                )));
            }
        }
        let c = self.compression_exponent;
        if !(c > 0.0 && c < 1.0) {
            return Err(invalid(format!(
                "compression exponent must be in (0, 1), got {c}"
            )));
        }
        if !(0.0..=1.0).contains(&self.energy_threshold) {
            return Err(invalid(format!(
                "energy threshold must be in [0, 1], got {}",
                self.energy_threshold
            )));
        }
        if self.top_hit_threshold > self.mega_hit_threshold {
            return Err(invalid(
                "top-hit threshold exceeds mega-hit threshold".to_string(),
            ));
        }
        let ConfidenceThresholds { high, medium } = self.confidence;
        if !(0.0 <= medium && medium <= high && high <= 1.0) {
            return Err(invalid(format!(
                "confidence thresholds must satisfy 0 <= medium <= high <= 1, got {medium} / {high}"
            )));
        }
        Ok(())
    }

    /// Likelihood ratio after dampening, as it enters the log-odds sum.
    pub fn effective_ratio(&self, kind: FeatureKind) -> f64 {
        let lr = self.likelihood_ratios.get(kind);
        match self.dampening {
            Dampening::Sqrt => lr.sqrt(),
            Dampening::None => lr,
        }
    }

    pub fn feature_applies(&self, kind: FeatureKind, song: &Song) -> bool {
        match kind {
            FeatureKind::Trailer => song.in_official_trailer,
            FeatureKind::CurrentAlbum => song.is_from_current_album,
            FeatureKind::TourOpener => song.tour_opener_count > 0,
            FeatureKind::Popularity => song.total_streams > self.popularity_threshold,
            FeatureKind::Energy => song.energy_score >= self.energy_threshold,
            FeatureKind::Upbeat => song.is_upbeat,
            FeatureKind::Solo => song.is_solo,
        }
    }

    pub fn penalty_applies(&self, kind: PenaltyKind, song: &Song) -> bool {
        let old_catalog = !song.is_from_current_album;
        match kind {
            PenaltyKind::MegaHit => song.total_streams > self.mega_hit_threshold && old_catalog,
            PenaltyKind::TopHitSoloUpbeat => {
                song.total_streams > self.top_hit_threshold
                    && old_catalog
                    && song.is_solo
                    && song.is_upbeat
            }
            PenaltyKind::TopHit => song.total_streams > self.top_hit_threshold && old_catalog,
            PenaltyKind::NonSolo => !song.is_solo,
        }
    }

    pub fn first_penalty(&self, song: &Song) -> Option<PenaltyRule> {
        self.penalties
            .iter()
            .copied()
            .find(|rule| self.penalty_applies(rule.kind, song))
    }
}
