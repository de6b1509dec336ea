//! File extension and MIME type for an inbound attachment.

const KNOWN: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/webp", ".webp"),
    ("image/heic", ".heic"),
    ("video/mp4", ".mp4"),
];

const FALLBACK: (&str, &str) = ("application/octet-stream", ".bin");

/// Prefers the declared content type and falls back to sniffing the leading
/// bytes when the declaration is missing or unknown.
pub fn file_type(content_type: &str, bytes: &[u8]) -> (&'static str, &'static str) {
    let declared = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let declared = if declared == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        declared
    };
    KNOWN
        .iter()
        .find(|(mime, _)| *mime == declared)
        .copied()
        .or_else(|| sniff(bytes))
        .unwrap_or(FALLBACK)
}

fn sniff(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
    let mime = if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        match &bytes[8..12] {
            b"heic" | b"heix" | b"mif1" => "image/heic",
            _ => "video/mp4",
        }
    } else {
        return None;
    };
    KNOWN.iter().find(|(known, _)| *known == mime).copied()
}
