//! Deterministic `trk_<sha1_12hex>` derivation from a source path (C13).

use sha1::{Digest, Sha1};
use std::path::Path;

/// `"trk_" + hex(sha1(utf8(path)))[..12]`.
pub fn track_id(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    let mut hasher = Sha1::new();
    hasher.update(path_str.as_bytes());
    let digest = hasher.finalize();
    let hex = hex_encode(&digest);
    format!("trk_{}", &hex[..12])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_prefixed() {
        let a = track_id(Path::new("/music/A/song.mp3"));
        let b = track_id(Path::new("/music/A/song.mp3"));
        assert_eq!(a, b);
        assert!(a.starts_with("trk_"));
        assert_eq!(a.len(), 4 + 12);
    }

    #[test]
    fn different_paths_differ() {
        let a = track_id(Path::new("/music/A/song.mp3"));
        let b = track_id(Path::new("/music/B/song.mp3"));
        assert_ne!(a, b);
    }
}
