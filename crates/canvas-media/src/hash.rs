//! Content identity (spec §3, "Hash"): SHA-256 over file bytes, and the
//! server-assigned filename scheme from §4.4 (`<unixMillis>-<base36>.<ext>`).

use rand::Rng;
use sha2::{Digest, Sha256};

/// Hash a file's bytes, returning the lowercase hex digest used as
/// `files.hash`.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Mint a server filename: `<unixMillis>-<base36rand>.<ext>`.
pub fn mint_filename(ext: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let rand_component: u32 = rand::thread_rng().gen_range(0..u32::MAX);
    format!("{millis}-{}.{ext}", to_base36(rand_component))
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap()
}

/// The file extension (without leading dot) implied by a filename, lowercased.
pub fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_hex() {
        let a = hash_bytes(b"hello world");
        let b = hash_bytes(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }

    #[test]
    fn mint_filename_has_millis_rand_ext_shape() {
        let name = mint_filename("png");
        assert!(name.ends_with(".png"));
        assert!(name.contains('-'));
    }
}
