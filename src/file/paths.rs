// Offline Media Core - offline media downloads for mobile playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Target path derivation for offline media
//!
//! Every media id maps to exactly one file name inside the download
//! directory, so a restart can find partial and completed files again
//! without consulting any stored path.
//!
//! # Naming
//! - Sanitised media id + extension derived from the mime type
//! - Ids that needed sanitising get a short digest suffix, keeping distinct
//!   ids on distinct files (`a/b` and `a_b` would otherwise collide)
//! - Partial bytes live next to the target as `<name>.<ext>.part`

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Suffix of the staging file that receives bytes during a transfer
pub const PARTIAL_SUFFIX: &str = "part";

/// Longest sanitised id kept before the digest suffix (bytes, ASCII only)
const MAX_ID_LENGTH: usize = 120;

/// Hex chars of the id digest appended to altered ids
const ID_DIGEST_LENGTH: usize = 8;

/// Known mime types and their file extensions
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    // Video
    ("video/mp4", "mp4"),
    ("video/x-m4v", "m4v"),
    ("video/webm", "webm"),
    ("video/x-matroska", "mkv"),
    ("video/quicktime", "mov"),
    ("video/mp2t", "ts"),
    ("application/x-mpegurl", "m3u8"),
    ("application/vnd.apple.mpegurl", "m3u8"),
    // Audio
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/mpeg", "mp3"),
    ("audio/aac", "aac"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "opus"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    // Subtitles
    ("text/vtt", "vtt"),
    ("application/x-subrip", "srt"),
    ("text/srt", "srt"),
    ("application/ttml+xml", "ttml"),
    ("text/x-ssa", "ass"),
];

/// File locations for one media item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPaths {
    /// Final location of the completed file
    pub target: PathBuf,

    /// Staging file written during the transfer
    pub partial: PathBuf,
}

impl MediaPaths {
    /// Build the paths for `media_id` inside `directory`
    pub fn new(directory: &Path, media_id: &str, mime_type: Option<&str>, fallback_extension: &str) -> Self {
        let target = directory.join(media_file_name(media_id, mime_type, fallback_extension));
        Self::for_target(target)
    }

    /// Paths for an already known target, e.g. from a stored record
    pub fn for_target(target: PathBuf) -> Self {
        let partial = partial_path(&target);
        Self { target, partial }
    }
}

/// Staging path for a target file (`movie.mp4` -> `movie.mp4.part`)
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Deterministic file name for a media id
pub fn media_file_name(media_id: &str, mime_type: Option<&str>, fallback_extension: &str) -> String {
    let extension = mime_type
        .and_then(extension_for_mime)
        .unwrap_or(fallback_extension);
    format!("{}.{}", sanitize_media_id(media_id), extension)
}

/// Map a mime type to a file extension
///
/// Parameters (`; codecs=...`) and case are ignored. Returns `None` for
/// unknown types so the caller can pick its fallback.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
}

/// Turn a media id into a safe file stem
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Leading dots are dropped so the file is never hidden or relative. The stem
/// is lowercased so ids differing only in case cannot meet on a
/// case-insensitive filesystem; any altered id gets a digest suffix.
pub fn sanitize_media_id(media_id: &str) -> String {
    let cleaned: String = media_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let mut stem = cleaned.trim_start_matches('.').to_string();
    stem.truncate(MAX_ID_LENGTH);
    if stem.is_empty() {
        stem = "media".to_string();
    }

    if stem == media_id {
        return stem;
    }

    let digest = hex::encode(Sha256::digest(media_id.as_bytes()));
    format!("{}-{}", stem, &digest[..ID_DIGEST_LENGTH])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_clean_ids() {
        assert_eq!(sanitize_media_id("movie-42_v2.1"), "movie-42_v2.1");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_chars() {
        let name = sanitize_media_id("show/s01:e02");
        assert!(name.starts_with("show_s01_e02-"));
        assert_eq!(name.len(), "show_s01_e02-".len() + ID_DIGEST_LENGTH);
    }

    #[test]
    fn test_sanitize_distinct_ids_stay_distinct() {
        assert_ne!(sanitize_media_id("a/b"), sanitize_media_id("a_b"));
        assert_ne!(sanitize_media_id("a/b"), sanitize_media_id("a:b"));
    }

    #[test]
    fn test_sanitize_case_variants_never_share_a_name() {
        let upper = sanitize_media_id("M1");
        let lower = sanitize_media_id("m1");
        assert_eq!(lower, "m1");
        assert!(upper.starts_with("m1-"));
        assert_ne!(upper.to_ascii_lowercase(), lower.to_ascii_lowercase());
        assert_ne!(
            sanitize_media_id("Episode").to_ascii_lowercase(),
            sanitize_media_id("EPISODE").to_ascii_lowercase()
        );
    }

    #[test]
    fn test_sanitize_edge_cases() {
        assert!(sanitize_media_id("").starts_with("media-"));
        assert!(sanitize_media_id("..").starts_with("media-"));
        assert!(!sanitize_media_id("../etc/passwd").contains('/'));
        assert!(!sanitize_media_id(".hidden").starts_with('.'));

        let long = "x".repeat(500);
        assert!(sanitize_media_id(&long).len() <= MAX_ID_LENGTH + 1 + ID_DIGEST_LENGTH);
    }

    #[test]
    fn test_sanitize_is_deterministic() {
        assert_eq!(sanitize_media_id("ünïcode id"), sanitize_media_id("ünïcode id"));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/mp4"), Some("mp4"));
        assert_eq!(extension_for_mime("Video/MP4; codecs=\"avc1\""), Some("mp4"));
        assert_eq!(extension_for_mime("text/vtt"), Some("vtt"));
        assert_eq!(extension_for_mime("application/x-subrip"), Some("srt"));
        assert_eq!(extension_for_mime("application/octet-stream"), None);
    }

    #[test]
    fn test_media_file_name_fallback() {
        assert_eq!(media_file_name("m1", Some("video/mp4"), "bin"), "m1.mp4");
        assert_eq!(media_file_name("m1", None, "bin"), "m1.bin");
        assert_eq!(media_file_name("m1", Some("weird/type"), "dat"), "m1.dat");
    }

    #[test]
    fn test_media_paths() {
        let paths = MediaPaths::new(Path::new("/data/offline"), "m1", Some("video/mp4"), "bin");
        assert_eq!(paths.target, PathBuf::from("/data/offline/m1.mp4"));
        assert_eq!(paths.partial, PathBuf::from("/data/offline/m1.mp4.part"));
    }
}
