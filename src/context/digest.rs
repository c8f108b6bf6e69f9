use sha2::{Digest, Sha256};

pub const DIGEST_PREFIX: &str = "sha256-";

/// Content digest of an archive, safe to embed in file names and URLs.
///
/// Renders as `sha256-` followed by 64 lowercase hex characters.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{}{}", DIGEST_PREFIX, hex::encode(Sha256::digest(bytes)))
}

/// True for strings produced by [`content_digest`]
pub fn is_content_digest(value: &str) -> bool {
    value
        .strip_prefix(DIGEST_PREFIX)
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_digest_known_value() {
        assert_eq!(
            content_digest(b""),
            "sha256-e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_is_content_digest() {
        assert!(is_content_digest(&content_digest(b"hello")));
        assert!(!is_content_digest("sha256:abc"));
        assert!(!is_content_digest(&content_digest(b"x").to_uppercase()));
    }
}
