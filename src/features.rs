use serde::Serialize;

use crate::catalog::{Catalog, Song};

const RECENCY_ONE_CYCLE: f64 = 1.20;
const RECENCY_TWO_CYCLES: f64 = 1.10;
const RECENCY_NONE: f64 = 1.00;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedFeatures {
    pub stream_velocity: f64,
    pub recency_bonus: f64,
    /// 1-based rank by total streams. Zero-stream songs are unranked and get
    /// the catalog size.
    pub catalog_rank: usize,
}

pub fn derive_features(song: &Song, catalog: &Catalog) -> DerivedFeatures {
    let ranking = stream_ranking(catalog);
    derive_with_ranking(song, catalog, &ranking)
}

/// Features for every song in catalog order, ranking the catalog once.
pub fn derive_catalog_features(catalog: &Catalog) -> Vec<DerivedFeatures> {
    let ranking = stream_ranking(catalog);
    catalog
        .songs()
        .iter()
        .map(|song| derive_with_ranking(song, catalog, &ranking))
        .collect()
}

pub fn stream_velocity(song: &Song) -> f64 {
    if song.total_streams == 0 {
        return 0.0;
    }
    song.daily_streams as f64 / song.total_streams as f64
}

pub fn recency_bonus(album_year: i32, reference_year: i32) -> f64 {
    let age = reference_year.saturating_sub(album_year);
    if age <= 1 {
        RECENCY_ONE_CYCLE
    } else if age <= 2 {
        RECENCY_TWO_CYCLES
    } else {
        RECENCY_NONE
    }
}

fn derive_with_ranking(song: &Song, catalog: &Catalog, ranking: &[&str]) -> DerivedFeatures {
    let catalog_rank = ranking
        .iter()
        .position(|id| *id == song.id)
        .map(|idx| idx + 1)
        .unwrap_or(catalog.len());
    DerivedFeatures {
        stream_velocity: stream_velocity(song),
        recency_bonus: recency_bonus(song.album_year, catalog.reference_year()),
        catalog_rank,
    }
}

// Stable sort keeps catalog order among equal stream counts.
fn stream_ranking(catalog: &Catalog) -> Vec<&str> {
    let mut ranked: Vec<&Song> = catalog
        .songs()
        .iter()
        .filter(|s| s.total_streams > 0)
        .collect();
    ranked.sort_by(|a, b| b.total_streams.cmp(&a.total_streams));
    ranked.into_iter().map(|s| s.id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::song;

    fn with_streams(id: &str, total: u64) -> Song {
        let mut s = song(id);
        s.total_streams = total;
        s
    }

    #[test]
    fn zero_stream_song_is_safe() {
        let zero = with_streams("z", 0);
        let catalog = Catalog::new(vec![with_streams("a", 10), zero.clone()]).unwrap();
        let f = derive_features(&zero, &catalog);
        assert_eq!(f.stream_velocity, 0.0);
        assert_eq!(f.catalog_rank, 2);
    }

    #[test]
    fn ranks_by_streams_with_stable_ties() {
        let catalog = Catalog::new(vec![
            with_streams("low", 5),
            with_streams("tie_a", 50),
            with_streams("tie_b", 50),
            with_streams("top", 90),
        ])
        .unwrap();
        let ranks: Vec<usize> = derive_catalog_features(&catalog)
            .iter()
            .map(|f| f.catalog_rank)
            .collect();
        assert_eq!(ranks, vec![4, 2, 3, 1]);
    }

    #[test]
    fn recency_tiers_are_discrete() {
        assert_eq!(recency_bonus(2026, 2026), 1.20);
        assert_eq!(recency_bonus(2025, 2026), 1.20);
        assert_eq!(recency_bonus(2024, 2026), 1.10);
        assert_eq!(recency_bonus(2023, 2026), 1.00);
        assert_eq!(recency_bonus(1999, 2026), 1.00);
    }

    #[test]
    fn recency_saturates_on_extreme_years() {
        assert_eq!(recency_bonus(i32::MAX, i32::MIN), 1.20);
        assert_eq!(recency_bonus(i32::MIN, i32::MAX), 1.00);
    }

    #[test]
    fn velocity_is_daily_over_total() {
        let mut s = with_streams("a", 1_000_000);
        s.daily_streams = 25_000;
        assert!((stream_velocity(&s) - 0.025).abs() < 1e-12);
    }

    #[test]
    fn song_outside_catalog_gets_sentinel_rank() {
        let catalog = Catalog::new(vec![with_streams("a", 10)]).unwrap();
        let stranger = with_streams("b", 99);
        assert_eq!(derive_features(&stranger, &catalog).catalog_rank, 1);
    }
}
