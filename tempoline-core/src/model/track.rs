//! `Track` entity (spec §3) and the mute/solo scheduling rule.

use super::ids::TrackId;

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub muted: bool,
    pub solo: bool,
}

impl Track {
    pub fn new(id: impl Into<TrackId>) -> Self {
        Self {
            id: id.into(),
            muted: false,
            solo: false,
        }
    }
}

/// "If any track is solo, only solo tracks play; else mute wins" (spec §3).
pub fn is_track_audible(track: &Track, any_track_soloed: bool) -> bool {
    if any_track_soloed {
        track.solo
    } else {
        !track.muted
    }
}

pub fn any_soloed<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> bool {
    tracks.into_iter().any(|t| t.solo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_wins_when_nothing_soloed() {
        let mut t = Track::new("t1");
        t.muted = true;
        assert!(!is_track_audible(&t, false));
    }

    #[test]
    fn solo_excludes_non_soloed_tracks() {
        let mut muted_but_not_considered = Track::new("t1");
        muted_but_not_considered.muted = false;
        assert!(!is_track_audible(&muted_but_not_considered, true));
    }

    #[test]
    fn soloed_track_plays_even_if_another_is_muted() {
        let mut t = Track::new("t2");
        t.solo = true;
        assert!(is_track_audible(&t, true));
    }
}
