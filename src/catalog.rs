use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, check_not_empty, check_unit_interval, check_year};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub name: String,
    pub album: String,
    pub album_year: i32,
    #[serde(alias = "spotifyStreams")]
    pub total_streams: u64,
    #[serde(alias = "spotifyDaily")]
    pub daily_streams: u64,
    pub is_solo: bool,
    #[serde(default)]
    pub featured_artist: Option<String>,
    pub is_upbeat: bool,
    pub energy_score: f64,
    pub in_official_trailer: bool,
    pub is_from_current_album: bool,
    pub tour_opener_count: u32,
    pub tour_play_count: u32,
    #[serde(default)]
    pub bpm_estimate: Option<u32>,
    #[serde(default)]
    pub notes: String,
}

impl Song {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let entity = format!("song {}", self.id);
        check_not_empty(&entity, "id", &self.id)?;
        check_not_empty(&entity, "name", &self.name)?;
        check_year(&entity, "albumYear", self.album_year)?;
        check_unit_interval(&entity, "energyScore", self.energy_score)?;

        // Solo tracks carry no guest at all, blank or not.
        let guest_ok = match self.featured_artist.as_deref() {
            None => self.is_solo,
            Some(guest) => !self.is_solo && !guest.trim().is_empty(),
        };
        if !guest_ok {
            return Err(ValidationError::FeaturedArtistMismatch {
                song_id: self.id.clone(),
                is_solo: self.is_solo,
            });
        }
        Ok(())
    }
}

/// A validated, immutable set of songs scored together.
///
/// Catalog composition matters for scoring: stream ranks and the recency
/// reference year are both relative to the whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    songs: Vec<Song>,
    reference_year: i32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { songs: Vec<Song> },
    Bare(Vec<Song>),
}

impl Catalog {
    pub fn new(songs: Vec<Song>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for song in &songs {
            song.validate()?;
            if !seen.insert(song.id.as_str()) {
                return Err(ValidationError::DuplicateSongId(song.id.clone()));
            }
        }
        let reference_year = songs.iter().map(|s| s.album_year).max().unwrap_or(0);
        Ok(Self {
            songs,
            reference_year,
        })
    }

    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw).context("invalid catalog json")?;
        let songs = match file {
            CatalogFile::Wrapped { songs } | CatalogFile::Bare(songs) => songs,
        };
        Ok(Self::new(songs)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load catalog {}", path.display()))
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn get(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::song;
    use super::*;

    #[test]
    fn rejects_energy_outside_unit_interval() {
        let mut s = song("a");
        s.energy_score = 1.2;
        let err = Catalog::new(vec![s]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "energyScore",
                ..
            }
        ));
    }

    #[test]
    fn featured_artist_must_match_solo_flag() {
        let mut guest_missing = song("a");
        guest_missing.is_solo = false;
        assert!(matches!(
            guest_missing.validate(),
            Err(ValidationError::FeaturedArtistMismatch { is_solo: false, .. })
        ));

        let mut solo_with_guest = song("b");
        solo_with_guest.featured_artist = Some("Guest".to_string());
        assert!(solo_with_guest.validate().is_err());

        let mut collab = song("c");
        collab.is_solo = false;
        collab.featured_artist = Some("Guest".to_string());
        assert!(collab.validate().is_ok());
    }

    #[test]
    fn blank_guest_is_rejected_either_way() {
        let mut solo_blank = song("a");
        solo_blank.featured_artist = Some("  ".to_string());
        assert!(matches!(
            solo_blank.validate(),
            Err(ValidationError::FeaturedArtistMismatch { is_solo: true, .. })
        ));

        let mut collab_blank = song("b");
        collab_blank.is_solo = false;
        collab_blank.featured_artist = Some(String::new());
        assert!(collab_blank.validate().is_err());
    }

    #[test]
    fn rejects_album_year_outside_window() {
        let mut s = song("a");
        s.album_year = i32::MIN;
        let err = Catalog::new(vec![s]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "albumYear",
                ..
            }
        ));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Catalog::new(vec![song("a"), song("a")]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateSongId("a".to_string()));
    }

    #[test]
    fn reference_year_is_newest_album() {
        let mut newer = song("b");
        newer.album_year = 2025;
        let catalog = Catalog::new(vec![song("a"), newer]).unwrap();
        assert_eq!(catalog.reference_year(), 2025);
        assert_eq!(catalog.with_reference_year(2026).reference_year(), 2026);
    }

    #[test]
    fn empty_catalog_is_valid() {
        let catalog = Catalog::new(Vec::new()).unwrap();
        assert!(catalog.is_empty());
        assert_eq!(catalog.reference_year(), 0);
    }

    #[test]
    fn parses_wrapped_catalog_with_vendor_aliases() {
        let raw = r#"{"songs":[{"id":"x","name":"X","album":"A","albumYear":2024,
            "spotifyStreams":2500000000,"spotifyDaily":900000,"isSolo":true,
            "featuredArtist":null,"isUpbeat":true,"energyScore":0.9,
            "inOfficialTrailer":false,"isFromCurrentAlbum":false,
            "tourOpenerCount":0,"tourPlayCount":12,"bpmEstimate":128}]}"#;
        let catalog = Catalog::from_json(raw).unwrap();
        let x = catalog.get("x").unwrap();
        assert_eq!(x.total_streams, 2_500_000_000);
        assert_eq!(x.bpm_estimate, Some(128));
    }

    #[test]
    fn negative_streams_fail_to_parse() {
        let raw = r#"[{"id":"x","name":"X","album":"A","albumYear":2024,
            "totalStreams":-5,"dailyStreams":0,"isSolo":true,"isUpbeat":true,
            "energyScore":0.9,"inOfficialTrailer":false,"isFromCurrentAlbum":false,
            "tourOpenerCount":0,"tourPlayCount":0}]"#;
        assert!(Catalog::from_json(raw).is_err());
    }
}
