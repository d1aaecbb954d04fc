//! Text normalization for artist/title matching.
//!
//! Raw strings coming from upstream listening services are full of noise:
//! featured-artist credits, "(Remastered 2011)" style annotations, stray
//! punctuation and inconsistent casing. Everything that compares two tracks
//! goes through these functions first, so they must be deterministic and
//! idempotent: normalizing an already-normalized string returns it unchanged.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Parenthesized or bracketed featured-artist credits in titles,
    /// e.g. "(feat. Someone)", "[ft. A & B]", "(with Mary)".
    static ref TITLE_FEAT_RE: Regex =
        Regex::new(r"(?i)\s*[(\[][^)\]]*\b(?:feat|ft|featuring|with)\b[^)\]]*[)\]]").unwrap();

    /// Parenthesized or bracketed version annotations,
    /// e.g. "(Remastered 2011)", "[Live]", "(Radio Edit)", "(Original Mix)".
    static ref TITLE_ANNOTATION_RE: Regex = Regex::new(
        r"(?i)\s*[(\[][^)\]]*\b(?:remaster(?:ed)?|live|radio\s+edit|radio\s+version|single\s+version|album\s+version|original\s+mix|explicit|clean)\b[^)\]]*[)\]]"
    )
    .unwrap();

    /// Trailing featured-artist clause in artist names, applied to already
    /// lower-cased, punctuation-free text: "artist feat other",
    /// "artist ft other", "artist with other". Deliberately does not touch
    /// "&" or "," (they are gone by now, but crucially nothing truncates at
    /// them either) since multi-artist legal names like "Simon & Garfunkel"
    /// must survive whole.
    static ref ARTIST_FEAT_RE: Regex =
        Regex::new(r"\s+(?:feat|ft|featuring|with)(?:\s+.*)?$").unwrap();

    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Normalize free text into a canonical comparable form.
///
/// Lower-cases, replaces every character that is not alphanumeric, whitespace
/// or an apostrophe with a space, collapses repeated whitespace and trims.
/// Never fails; empty input yields empty output.
pub fn normalize_text(s: &str) -> String {
    let lowered = s.to_lowercase();
    let replaced: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    WHITESPACE_RE.replace_all(replaced.trim(), " ").into_owned()
}

/// Normalize a track title.
///
/// Strips bracketed featured-artist credits first, then bracketed version
/// annotations (remaster/live/radio edit/single or album version/original
/// mix/explicit/clean), then applies [`normalize_text`]. The order matters:
/// "(feat. X) [Remastered]" loses the credit before the annotation pass so
/// neither survives into the comparable form.
pub fn normalize_title(s: &str) -> String {
    let without_feat = TITLE_FEAT_RE.replace_all(s, "");
    let without_annotations = TITLE_ANNOTATION_RE.replace_all(&without_feat, "");
    normalize_text(&without_annotations)
}

/// Normalize an artist name.
///
/// Applies [`normalize_text`] first, then strips a trailing featured-artist
/// clause ("feat", "ft", "featuring", standalone "with"). Stripping after
/// text normalization keeps the function idempotent: once the clause is gone
/// there is nothing left for a second pass to remove. Does not split on "&"
/// or ",", those belong to multi-artist names and truncating there would
/// mangle "Crosby, Stills, Nash & Young" into "Crosby".
pub fn normalize_artist(s: &str) -> String {
    let normalized = normalize_text(s);
    ARTIST_FEAT_RE.replace(&normalized, "").into_owned()
}

/// A raw (artist, title) pair reduced to its canonical comparable form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedTrack {
    pub artist: String,
    pub title: String,
}

impl NormalizedTrack {
    /// Normalize a raw artist/title pair.
    pub fn from_raw(artist: &str, title: &str) -> Self {
        Self {
            artist: normalize_artist(artist),
            title: normalize_title(title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text_basic() {
        assert_eq!(normalize_text("Hello, World!"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_normalize_text_preserves_apostrophes() {
        assert_eq!(normalize_text("Don't Stop Me Now"), "don't stop me now");
        assert_eq!(normalize_text("Rock 'N' Roll"), "rock 'n' roll");
    }

    #[test]
    fn test_normalize_text_strips_punctuation() {
        assert_eq!(normalize_text("AC/DC"), "ac dc");
        assert_eq!(normalize_text("P!nk"), "p nk");
        assert_eq!(normalize_text("Sigur Rós"), "sigur rós");
    }

    #[test]
    fn test_normalize_text_idempotent() {
        for s in [
            "Hello, World!",
            "Don't Stop Me Now",
            "  AC/DC  ",
            "Ænima (2019 Remaster)",
            "",
        ] {
            let once = normalize_text(s);
            assert_eq!(normalize_text(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_title_strips_featuring() {
        assert_eq!(normalize_title("Song Name (feat. Other Artist)"), "song name");
        assert_eq!(normalize_title("Song Name [ft. Other]"), "song name");
        assert_eq!(normalize_title("Song Name (with Mary)"), "song name");
    }

    #[test]
    fn test_normalize_title_strips_annotations() {
        assert_eq!(
            normalize_title("Bohemian Rhapsody (Remastered 2011)"),
            "bohemian rhapsody"
        );
        assert_eq!(normalize_title("Alive (Live)"), "alive");
        assert_eq!(normalize_title("Blue Monday [Radio Edit]"), "blue monday");
        assert_eq!(normalize_title("Levels (Original Mix)"), "levels");
        assert_eq!(normalize_title("Forgot About Dre (Explicit)"), "forgot about dre");
        assert_eq!(normalize_title("Lose Yourself (Clean)"), "lose yourself");
        assert_eq!(normalize_title("Creep (Single Version)"), "creep");
    }

    #[test]
    fn test_normalize_title_strips_both_kinds() {
        assert_eq!(
            normalize_title("Song Name (feat. Guest) [Remastered]"),
            "song name"
        );
    }

    #[test]
    fn test_normalize_title_keeps_plain_parentheticals() {
        // A parenthetical that is neither a credit nor an annotation is part
        // of the title; only its punctuation goes away.
        assert_eq!(
            normalize_title("Don't Look Back in Anger (Part 2)"),
            "don't look back in anger part 2"
        );
    }

    #[test]
    fn test_normalize_title_idempotent() {
        for s in [
            "Bohemian Rhapsody (Remastered 2011)",
            "Song Name (feat. Guest) [Live]",
            "Plain Title",
        ] {
            let once = normalize_title(s);
            assert_eq!(normalize_title(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_artist_strips_featuring() {
        assert_eq!(normalize_artist("Main Artist feat. Other"), "main artist");
        assert_eq!(normalize_artist("Main Artist ft Other"), "main artist");
        assert_eq!(normalize_artist("Main Artist featuring Other"), "main artist");
        assert_eq!(normalize_artist("Main Artist with Other"), "main artist");
    }

    #[test]
    fn test_normalize_artist_preserves_multi_artist_names() {
        let simon = normalize_artist("Simon & Garfunkel");
        assert!(simon.contains("simon"));
        assert!(simon.contains("garfunkel"));

        let csny = normalize_artist("Crosby, Stills, Nash & Young");
        assert!(csny.contains("crosby"));
        assert!(csny.contains("young"));
    }

    #[test]
    fn test_normalize_artist_leading_with_is_kept() {
        // "with" only starts a featured clause when it is an interior word.
        assert_eq!(normalize_artist("With Confidence"), "with confidence");
    }

    #[test]
    fn test_normalize_artist_idempotent() {
        for s in [
            "Main Artist feat. Other",
            "Simon & Garfunkel",
            "Crosby, Stills, Nash & Young",
            // Parenthesized credit: the parens dissolve into spaces during
            // text normalization, so the clause must still be stripped in
            // the same pass.
            "Main Artist (with Other)",
        ] {
            let once = normalize_artist(s);
            assert_eq!(normalize_artist(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_normalize_artist_parenthesized_credit() {
        assert_eq!(normalize_artist("Main Artist (feat. Other)"), "main artist");
        assert_eq!(normalize_artist("Main Artist (with Other)"), "main artist");
    }

    #[test]
    fn test_normalized_track_from_raw() {
        let t = NormalizedTrack::from_raw("QUEEN", "Bohemian Rhapsody (Remastered 2011)");
        assert_eq!(t.artist, "queen");
        assert_eq!(t.title, "bohemian rhapsody");
    }
}
