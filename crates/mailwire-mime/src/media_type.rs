//! Media type detection for attachments.
//!
//! Outgoing attachments are typed from their file extension. Downloaded
//! attachments fall back to their leading bytes, then the server's declared
//! type, when the extension says nothing.

/// Fallback media type.
pub const OCTET_STREAM: &str = "application/octet-stream";

const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("log", "text/plain"),
    ("csv", "text/csv"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("md", "text/markdown"),
    ("ics", "text/calendar"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("7z", "application/x-7z-compressed"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("ico", "image/vnd.microsoft.icon"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("eml", "message/rfc822"),
];

/// Looks up a media type from a filename's extension.
///
/// Returns [`OCTET_STREAM`] for unknown or missing extensions.
#[must_use]
pub fn from_extension(filename: &str) -> &'static str {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return OCTET_STREAM;
    };
    EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map_or(OCTET_STREAM, |(_, media_type)| media_type)
}

/// Identifies a media type from magic bytes.
#[must_use]
pub fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if data.starts_with(b"PK\x03\x04") {
        Some("application/zip")
    } else {
        None
    }
}

/// Resolves the media type of downloaded content.
///
/// Order: magic bytes, then the declared type, then [`OCTET_STREAM`].
#[must_use]
pub fn resolve(data: &[u8], declared: Option<&str>) -> String {
    if let Some(sniffed) = sniff(data) {
        return sniffed.to_string();
    }
    declared
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(|| OCTET_STREAM.to_string(), str::to_ascii_lowercase)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(from_extension("report.pdf"), "application/pdf");
        assert_eq!(from_extension("PHOTO.JPG"), "image/jpeg");
        assert_eq!(from_extension("archive.tar.gz"), "application/gzip");
        assert_eq!(from_extension("README"), OCTET_STREAM);
        assert_eq!(from_extension("data.unknownext"), OCTET_STREAM);
    }

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n...."), Some("image/png"));
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff(b"GIF89a..."), Some("image/gif"));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff(b"%PDF-1.4"), Some("application/pdf"));
        assert_eq!(sniff(b"PK\x03\x04rest"), Some("application/zip"));
        assert_eq!(sniff(b"plain text"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn test_resolve_order() {
        assert_eq!(resolve(b"%PDF-1.7", Some("text/plain")), "application/pdf");
        assert_eq!(resolve(b"hello", Some("Text/Plain")), "text/plain");
        assert_eq!(resolve(b"hello", None), OCTET_STREAM);
        assert_eq!(resolve(b"hello", Some("  ")), OCTET_STREAM);
    }
}
