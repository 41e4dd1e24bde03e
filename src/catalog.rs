use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Context as _;
use regex::Regex;

use crate::error::FrameloomResult;

/// Exposure label of one bracketed capture: `a` (under), `b` (normal), `c` (over).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Exposure {
    A,
    B,
    C,
}

impl Exposure {
    fn from_letter(s: &str) -> Option<Self> {
        match s {
            "a" => Some(Self::A),
            "b" => Some(Self::B),
            "c" => Some(Self::C),
            _ => None,
        }
    }
}

/// One discovered frame file plus the sort key parsed from its filename stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameId {
    pub path: PathBuf,
    pub number: u32,
    pub exposure: Exposure,
}

// Stem shape: optional non-digit prefix, exactly 5 digits, one exposure letter.
// Extension-agnostic; anything else is not a frame.
static STEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D*(\d{5})([a-c])$").expect("frame stem regex is valid"));

fn parse_stem(stem: &str) -> Option<(u32, Exposure)> {
    let caps = STEM_RE.captures(stem)?;
    let number = caps[1].parse::<u32>().ok()?;
    let exposure = Exposure::from_letter(&caps[2])?;
    Some((number, exposure))
}

/// Scan a directory (non-recursive) for frame files and return them in
/// deterministic `(number, exposure)` order.
///
/// Filenames whose stem does not match the expected shape are skipped, never an
/// error. Without bracketing only the `a` exposure is accepted. An empty result
/// is valid; the caller decides whether that is fatal.
pub fn scan(dir: &Path, bracketing: bool) -> FrameloomResult<Vec<FrameId>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read frame directory '{}'", dir.display()))?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list frame directory '{}'", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((number, exposure)) = parse_stem(stem) else {
            continue;
        };
        if !bracketing && exposure != Exposure::A {
            continue;
        }
        frames.push(FrameId {
            path,
            number,
            exposure,
        });
    }

    frames.sort_by_key(|f| (f.number, f.exposure));

    if bracketing && !frames.len().is_multiple_of(3) {
        tracing::warn!(
            total = frames.len(),
            leftover = frames.len() % 3,
            "bracketed catalog is not a multiple of 3; trailing partial group will be dropped"
        );
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn parse_stem_accepts_expected_shapes() {
        assert_eq!(parse_stem("frame00042a"), Some((42, Exposure::A)));
        assert_eq!(parse_stem("00001c"), Some((1, Exposure::C)));
        assert_eq!(parse_stem("scan-00100b"), Some((100, Exposure::B)));
    }

    #[test]
    fn parse_stem_rejects_wrong_shapes() {
        assert_eq!(parse_stem("frame42a"), None); // not 5 digits
        assert_eq!(parse_stem("frame000042a"), None); // too many digits
        assert_eq!(parse_stem("frame00042"), None); // no exposure letter
        assert_eq!(parse_stem("frame00042d"), None); // letter out of range
        assert_eq!(parse_stem("frame00042A"), None); // case-sensitive
        assert_eq!(parse_stem("notes"), None);
    }

    #[test]
    fn scan_sorts_by_number_then_exposure() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "frame00002b.png");
        touch(tmp.path(), "frame00001c.png");
        touch(tmp.path(), "frame00002a.png");
        touch(tmp.path(), "frame00001a.png");
        touch(tmp.path(), "frame00001b.png");
        touch(tmp.path(), "frame00002c.png");

        let frames = scan(tmp.path(), true).unwrap();
        let keys: Vec<_> = frames.iter().map(|f| (f.number, f.exposure)).collect();
        assert_eq!(
            keys,
            vec![
                (1, Exposure::A),
                (1, Exposure::B),
                (1, Exposure::C),
                (2, Exposure::A),
                (2, Exposure::B),
                (2, Exposure::C),
            ]
        );
    }

    #[test]
    fn scan_without_bracketing_keeps_only_a_exposure() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "frame00001a.png");
        touch(tmp.path(), "frame00001b.png");
        touch(tmp.path(), "frame00002a.png");
        touch(tmp.path(), "README.md");

        let frames = scan(tmp.path(), false).unwrap();
        let keys: Vec<_> = frames.iter().map(|f| f.number).collect();
        assert_eq!(keys, vec![1, 2]);
        assert!(frames.iter().all(|f| f.exposure == Exposure::A));
    }

    #[test]
    fn scan_skips_non_matching_names_without_error() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "thumbs.db");
        touch(tmp.path(), "frame1.png");
        touch(tmp.path(), "frame00001x.png");

        let frames = scan(tmp.path(), false).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn scan_with_partial_group_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "frame00001a.png");
        touch(tmp.path(), "frame00001b.png");

        let frames = scan(tmp.path(), true).unwrap();
        assert_eq!(frames.len(), 2);
    }
}
