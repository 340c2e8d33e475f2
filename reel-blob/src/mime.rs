//! Content-type detection for served media.
//!
//! Lookup order: video overrides by extension, `mime_guess` by extension,
//! magic bytes for extension-less files, then `application/octet-stream`.

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes needed by [`sniff`].
pub const SNIFF_LEN: usize = 16;

fn video_override(ext: &str) -> Option<&'static str> {
    match ext {
        "mp4" | "m4v" => Some("video/mp4"),
        "mkv" => Some("video/x-matroska"),
        "avi" => Some("video/x-msvideo"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

/// Content type derived from the file name alone.
pub fn from_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if let Some(known) = video_override(&ext) {
        return Some(known.to_string());
    }
    mime_guess::from_ext(&ext)
        .first()
        .map(|m| m.essence_str().to_string())
}

/// Content type from the leading bytes of a file.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        if head.len() >= 12 && &head[8..10] == b"qt" {
            return Some("video/quicktime");
        }
        return Some("video/mp4");
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/x-matroska");
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"AVI " {
        return Some("video/x-msvideo");
    }
    None
}

/// Best effort; never fails.
pub fn detect(path: &Path, head: &[u8]) -> String {
    from_extension(path)
        .or_else(|| sniff(head).map(str::to_string))
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extensions_win_over_registry() {
        assert_eq!(detect(Path::new("a.MKV"), &[]), "video/x-matroska");
        assert_eq!(detect(Path::new("clip.mov"), &[]), "video/quicktime");
        assert_eq!(detect(Path::new("movie.mp4"), &[]), "video/mp4");
    }

    #[test]
    fn registry_covers_other_extensions() {
        assert_eq!(detect(Path::new("notes.txt"), &[]), "text/plain");
    }

    #[test]
    fn sniffs_extensionless_files() {
        let mp4 = [0, 0, 0, 0x20, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm'];
        assert_eq!(detect(Path::new("movie"), &mp4), "video/mp4");

        let mkv = [0x1A, 0x45, 0xDF, 0xA3, 0x01];
        assert_eq!(detect(Path::new("movie"), &mkv), "video/x-matroska");

        let avi = *b"RIFF\0\0\0\0AVI LIST";
        assert_eq!(detect(Path::new("movie"), &avi), "video/x-msvideo");
    }

    #[test]
    fn falls_back_to_octet_stream() {
        assert_eq!(detect(Path::new("movie"), b"hello"), OCTET_STREAM);
        assert_eq!(detect(Path::new("weird.zzzunknown"), &[]), OCTET_STREAM);
    }
}
