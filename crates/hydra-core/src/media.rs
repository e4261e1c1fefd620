//! Media type detection for blobs moving across the bridge.
//!
//! Downloaded media rarely comes with a trustworthy content type, so the
//! mime is sniffed from magic bytes, covering the formats the bridge
//! actually transports. Extension mapping rides on `mime_guess`.

/// Detect a mime type from leading magic bytes. Falls back to
/// `application/octet-stream`.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return "image/jpeg";
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }
    if data.starts_with(b"\x1a\x45\xdf\xa3") {
        // EBML header: webm (and matroska, which the bridge treats the same)
        return "video/webm";
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return "video/mp4";
    }
    if data.starts_with(b"OggS") {
        return "audio/ogg";
    }
    if data.starts_with(b"#!AMR") {
        return "audio/amr";
    }
    if data.starts_with(b"ID3") || data.starts_with(b"\xff\xfb") || data.starts_with(b"\xff\xf3")
    {
        return "audio/mpeg";
    }
    if data.starts_with(b"\x1f\x8b") {
        return "application/gzip";
    }
    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if data.starts_with(b"PK\x03\x04") {
        return "application/zip";
    }
    "application/octet-stream"
}

/// Preferred file extension (with leading dot) for a mime type; empty when
/// unknown.
pub fn extension_for(mime: &str) -> String {
    // Common cases first: mime_guess orders some extension lists oddly
    // (e.g. "jfif" before "jpg").
    let known = match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "audio/ogg" => "ogg",
        "audio/amr" => "amr",
        "audio/mpeg" => "mp3",
        "application/gzip" => "gz",
        _ => "",
    };
    if !known.is_empty() {
        return format!(".{known}");
    }
    match mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first()) {
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(sniff_mime(b"\xff\xd8\xff\xe0data"), "image/jpeg");
        assert_eq!(sniff_mime(b"GIF89a..."), "image/gif");
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(b"OggSdata"), "audio/ogg");
        assert_eq!(sniff_mime(b"#!AMR\n"), "audio/amr");
        assert_eq!(sniff_mime(b"\x1a\x45\xdf\xa3more"), "video/webm");
        assert_eq!(sniff_mime(b"\x00\x00\x00\x18ftypisom"), "video/mp4");
        assert_eq!(sniff_mime(b"\x1f\x8b\x08"), "application/gzip");
        assert_eq!(sniff_mime(b"junk"), "application/octet-stream");
    }

    #[test]
    fn extensions_match_formats() {
        assert_eq!(extension_for("image/jpeg"), ".jpg");
        assert_eq!(extension_for("image/gif"), ".gif");
        assert_eq!(extension_for("video/mp4"), ".mp4");
        assert_eq!(extension_for("application/x-unknown-thing"), "");
    }
}
