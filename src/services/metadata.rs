//! The metadata document uploaded next to each video.
//!
//! The document is line-oriented UTF-8 text. The first line is a `version`
//! header, followed by `key: value` lines:
//!
//! ```text
//! version: 1
//! guid: 6f1c3c1e-2b1f-4a8e-9d7e-0b5f0c9a1d2e
//! title: Harbour at dawn
//! description: Walk along the pier
//! length: 93.4
//! ```
//!
//! A value runs from the first `:` to the end of the line and is trimmed.
//! Unknown keys are ignored so that newer uploaders stay readable.

use thiserror::Error;
use uuid::Uuid;

/// The version written by [`encode`].
pub const CURRENT_VERSION: u32 = 1;

/// Errors reported by the strict decoder.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadataError {
    #[error("missing version header")]
    MissingVersion,
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    #[error("line {0} is not a key: value pair")]
    MalformedLine(usize),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid guid: {0}")]
    InvalidGuid(String),
    #[error("invalid length: {0}")]
    InvalidLength(String),
}

/// The fields the server cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    pub version: u32,
    pub guid: Option<Uuid>,
    pub title: String,
    pub description: String,
    /// Whole seconds; fractional seconds are truncated.
    pub length: i32,
}

fn split_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(|line| line.trim_end_matches('\r'))
}

fn parse_version(value: &str) -> Option<u32> {
    value.parse().ok().filter(|v| *v >= 1)
}

fn parse_length(value: &str) -> Option<i32> {
    let seconds: f64 = value.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 || seconds >= i32::MAX as f64 {
        return None;
    }
    Some(seconds.trunc() as i32)
}

/// Decodes a document, rejecting anything that does not match the format.
///
/// # Errors
///
/// Returns a [`MetadataError`] describing the first problem found.
pub fn decode(text: &str) -> Result<VideoMetadata, MetadataError> {
    let mut lines = lines(text).enumerate().filter(|(_, l)| !l.trim().is_empty());

    let version = match lines.next().map(|(_, l)| split_line(l)) {
        Some(Some(("version", value))) => {
            parse_version(value).ok_or_else(|| MetadataError::UnsupportedVersion(value.to_string()))?
        }
        _ => return Err(MetadataError::MissingVersion),
    };

    let mut guid = None;
    let mut title = None;
    let mut description = None;
    let mut length = None;

    for (number, line) in lines {
        let (key, value) = split_line(line).ok_or(MetadataError::MalformedLine(number + 1))?;
        match key {
            "guid" => {
                guid = Some(
                    Uuid::parse_str(value).map_err(|_| MetadataError::InvalidGuid(value.to_string()))?,
                )
            }
            "title" => title = Some(value.to_string()),
            "description" => description = Some(value.to_string()),
            "length" => {
                length = Some(
                    parse_length(value).ok_or_else(|| MetadataError::InvalidLength(value.to_string()))?,
                )
            }
            _ => {}
        }
    }

    Ok(VideoMetadata {
        version,
        guid,
        title: title.ok_or(MetadataError::MissingField("title"))?,
        description: description.ok_or(MetadataError::MissingField("description"))?,
        length: length.ok_or(MetadataError::MissingField("length"))?,
    })
}

/// Reads a payload of unknown quality.
///
/// Never fails. A well-formed document is decoded strictly; anything else
/// falls back to reading each field independently, leaving a missing or
/// malformed field empty or zero without affecting the others.
pub fn best_effort(raw: &[u8]) -> VideoMetadata {
    let text = String::from_utf8_lossy(raw);
    match decode(&text) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::debug!("Metadata is not a well-formed document ({}), reading fields", e);
            extract_fields(&text)
        }
    }
}

fn extract_fields(text: &str) -> VideoMetadata {
    let mut meta = VideoMetadata::default();

    for (key, value) in lines(text).filter_map(split_line) {
        match key {
            "version" => meta.version = parse_version(value).unwrap_or(0),
            "guid" => meta.guid = Uuid::parse_str(value).ok(),
            "title" => meta.title = value.to_string(),
            "description" => meta.description = value.to_string(),
            "length" => meta.length = parse_length(value).unwrap_or(0),
            _ => {}
        }
    }

    meta
}

/// Encodes a document in the current version.
///
/// Line breaks inside values are flattened to spaces.
pub fn encode(meta: &VideoMetadata) -> String {
    let flatten = |value: &str| value.replace(['\r', '\n'], " ");
    let mut out = format!("version: {}\n", CURRENT_VERSION);
    if let Some(guid) = meta.guid {
        out.push_str(&format!("guid: {}\n", guid));
    }
    out.push_str(&format!("title: {}\n", flatten(&meta.title)));
    out.push_str(&format!("description: {}\n", flatten(&meta.description)));
    out.push_str(&format!("length: {}\n", meta.length));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "version: 1\r\nguid: 6f1c3c1e-2b1f-4a8e-9d7e-0b5f0c9a1d2e\r\ntitle: Harbour at dawn\r\ndescription: Walk along the pier: part 1\r\nlength: 93.9\r\n";

    #[test]
    fn test_decode_sample() {
        let meta = decode(SAMPLE).unwrap();
        assert_eq!(meta.version, 1);
        assert_eq!(meta.title, "Harbour at dawn");
        assert_eq!(meta.description, "Walk along the pier: part 1");
        assert_eq!(meta.length, 93);
        assert!(meta.guid.is_some());
    }

    #[test]
    fn test_decode_rejects_missing_header() {
        assert_eq!(decode("title: x\n"), Err(MetadataError::MissingVersion));
        assert_eq!(decode(""), Err(MetadataError::MissingVersion));
    }

    #[test]
    fn test_decode_reports_bad_fields() {
        assert_eq!(
            decode("version: 1\ntitle: a\ndescription: b\nlength: soon\n"),
            Err(MetadataError::InvalidLength("soon".to_string()))
        );
        assert_eq!(
            decode("version: 1\ntitle: a\nlength: 3\n"),
            Err(MetadataError::MissingField("description"))
        );
        assert_eq!(
            decode("version: 1\njust some words\n"),
            Err(MetadataError::MalformedLine(2))
        );
    }

    #[test]
    fn test_best_effort_keeps_good_fields() {
        let meta = best_effort(b"garbage header\ntitle: Still here\nlength: -4\n");
        assert_eq!(meta.title, "Still here");
        assert_eq!(meta.description, "");
        assert_eq!(meta.length, 0);
        assert_eq!(meta.version, 0);
    }

    #[test]
    fn test_best_effort_prefers_strict_decode() {
        assert_eq!(best_effort(SAMPLE.as_bytes()), decode(SAMPLE).unwrap());
    }

    #[test]
    fn test_best_effort_reads_fields_of_unsupported_version() {
        let meta = best_effort(b"version: 0\ntitle: Old uploader\nlength: 7\n");
        assert_eq!(meta.title, "Old uploader");
        assert_eq!(meta.length, 7);
        assert_eq!(meta.version, 0);
    }

    #[test]
    fn test_best_effort_on_binary_input() {
        let meta = best_effort(&[0xff, 0xfe, 0x00, 0x10]);
        assert_eq!(meta, VideoMetadata::default());
    }

    #[test]
    fn test_encode_is_decodable() {
        let meta = VideoMetadata {
            version: CURRENT_VERSION,
            guid: None,
            title: "Two\nlines".to_string(),
            description: "desc".to_string(),
            length: 12,
        };
        let decoded = decode(&encode(&meta)).unwrap();
        assert_eq!(decoded.title, "Two lines");
        assert_eq!(decoded.length, 12);
    }
}
