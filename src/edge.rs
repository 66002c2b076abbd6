use serde::Serialize;

use crate::market::{MarketPrice, MarketSource};
use crate::predictions::{Confidence, Prediction};

const STRONG_EDGE: f64 = 0.05;
const MILD_EDGE: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Neutral,
    Avoid,
    StrongAvoid,
}

impl Signal {
    pub fn label(self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG BUY",
            Signal::Buy => "BUY",
            Signal::Neutral => "NEUTRAL",
            Signal::Avoid => "AVOID",
            Signal::StrongAvoid => "STRONG AVOID",
        }
    }
}

/// Thresholds are strict and mirror around zero: `signal(-e)` is the
/// opposite band of `signal(e)`.
pub fn signal_for_edge(edge: f64) -> Signal {
    if edge > STRONG_EDGE {
        Signal::StrongBuy
    } else if edge > MILD_EDGE {
        Signal::Buy
    } else if edge < -STRONG_EDGE {
        Signal::StrongAvoid
    } else if edge < -MILD_EDGE {
        Signal::Avoid
    } else {
        Signal::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueProbability {
    pub source: MarketSource,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeAnalysis {
    pub song_id: String,
    pub song: String,
    pub our_probability: f64,
    pub market_probability: f64,
    pub venues: Vec<VenueProbability>,
    pub edge: f64,
    pub signal: Signal,
    pub confidence: Confidence,
    pub reasoning: Vec<String>,
}

impl EdgeAnalysis {
    /// False when no venue quoted the song; the signal is then measured
    /// against a hard zero and should not be traded on.
    pub fn has_market_coverage(&self) -> bool {
        self.market_probability > 0.0
    }
}

/// Each slice in `sources` is one venue. A venue contributes only if it has
/// a positive quote for the song; the market probability is the mean over
/// contributing venues, or 0 when none do.
pub fn calculate_edge(predictions: &[Prediction], sources: &[&[MarketPrice]]) -> Vec<EdgeAnalysis> {
    predictions
        .iter()
        .map(|pred| {
            let venues: Vec<VenueProbability> = sources
                .iter()
                .filter_map(|venue| venue.iter().find(|m| m.song_id == pred.song_id))
                .filter(|m| m.midpoint > 0.0)
                .map(|m| VenueProbability {
                    source: m.source,
                    probability: m.midpoint,
                })
                .collect();

            let market_probability = if venues.is_empty() {
                0.0
            } else {
                venues.iter().map(|v| v.probability).sum::<f64>() / venues.len() as f64
            };
            let edge = pred.probability - market_probability;

            EdgeAnalysis {
                song_id: pred.song_id.clone(),
                song: pred.song.clone(),
                our_probability: pred.probability,
                market_probability,
                venues,
                edge,
                signal: signal_for_edge(edge),
                confidence: pred.confidence,
                reasoning: pred.reasoning.clone(),
            }
        })
        .collect()
}
