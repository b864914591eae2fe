//! Path — request-path grammar.
//!
//! ```text
//! /hls/video+<id>/<rendition>/<chunk>.ts        → ManifestId
//! /cmaf/<id>/<chunk>.m4s                        → ManifestId
//! /recordings/videorec+<id>/<file>.mp4          → StreamId
//! ```

use super::model::{ClassifyError, EntityKind};

const MIN_SEGMENTS: usize = 4;
const ALLOWED_EXTENSIONS: &[&str] = &[".m3u8", ".ts", ".mp4", ".m4s"];
const ID_PREFIXES: &[&str] = &["video+", "videorec+"];

/// Attribute a request path to an entity.
pub fn entity_from_path(path: &str) -> Result<(EntityKind, String), ClassifyError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < MIN_SEGMENTS {
        return Err(ClassifyError::TooFewSegments(segments.len()));
    }

    let last = segments[segments.len() - 1];
    let ext = extension(last);
    if !ALLOWED_EXTENSIONS.contains(&ext) {
        return Err(ClassifyError::WrongExtension(ext.to_string()));
    }

    let kind = match segments[1] {
        "hls" | "cmaf" => EntityKind::ManifestId,
        "recordings" => EntityKind::StreamId,
        other => return Err(ClassifyError::UnknownPrefix(other.to_string())),
    };

    let mut id = segments[2];
    for prefix in ID_PREFIXES {
        id = id.strip_prefix(prefix).unwrap_or(id);
    }
    if id.is_empty() {
        return Err(ClassifyError::EmptyId);
    }

    Ok((kind, id.to_string()))
}

/// Extension including the dot, or `""`.
fn extension(file: &str) -> &str {
    match file.rfind('.') {
        Some(i) => &file[i..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hls_manifest() {
        let (kind, id) = entity_from_path("/hls/video+9e70xehvtu637q6p/5/chunk_1031999.ts").unwrap();
        assert_eq!(kind, EntityKind::ManifestId);
        assert_eq!(id, "9e70xehvtu637q6p");
    }

    #[test]
    fn test_hls_playlist_without_prefix() {
        let (kind, id) = entity_from_path("/hls/abc123/index.m3u8").unwrap();
        assert_eq!(kind, EntityKind::ManifestId);
        assert_eq!(id, "abc123");
    }

    #[test]
    fn test_cmaf_manifest() {
        let (kind, id) = entity_from_path("/cmaf/video+xyz/0/seg_1.m4s").unwrap();
        assert_eq!(kind, EntityKind::ManifestId);
        assert_eq!(id, "xyz");
    }

    #[test]
    fn test_recording_stream() {
        let (kind, id) = entity_from_path("/recordings/videorec+d0f1/source.mp4").unwrap();
        assert_eq!(kind, EntityKind::StreamId);
        assert_eq!(id, "d0f1");
    }

    #[test]
    fn test_many_ids_classify_consistently() {
        for id in ["a", "0000", "9e70xehvtu637q6p", "with-dash_und"] {
            let path = format!("/hls/video+{}/1/2/3/index.m3u8", id);
            assert_eq!(entity_from_path(&path).unwrap(), (EntityKind::ManifestId, id.to_string()));

            let path = format!("/recordings/{}/file.mp4", id);
            assert_eq!(entity_from_path(&path).unwrap(), (EntityKind::StreamId, id.to_string()));
        }
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(
            entity_from_path("/static/app/main.ts"),
            Err(ClassifyError::UnknownPrefix("static".to_string()))
        );
    }

    #[test]
    fn test_wrong_extension() {
        assert_eq!(
            entity_from_path("/hls/abc/thumb.jpg"),
            Err(ClassifyError::WrongExtension(".jpg".to_string()))
        );
        assert_eq!(
            entity_from_path("/hls/abc/noext"),
            Err(ClassifyError::WrongExtension(String::new()))
        );
    }

    #[test]
    fn test_too_few_segments() {
        assert_eq!(entity_from_path("/hls/x.ts"), Err(ClassifyError::TooFewSegments(3)));
        assert_eq!(entity_from_path("-"), Err(ClassifyError::TooFewSegments(1)));
    }

    #[test]
    fn test_empty_id() {
        assert_eq!(entity_from_path("/hls/video+/index.m3u8"), Err(ClassifyError::EmptyId));
    }
}
