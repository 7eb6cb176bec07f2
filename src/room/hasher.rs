use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable, non-reversible identifier for a room, derived from the
/// client-supplied room token. Used as the field name in the presence
/// store and in every log line; raw tokens never leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How room tokens become room keys.
#[derive(Debug, Clone)]
enum HashMode {
    /// Development only: the key is the raw token, so rooms are easy to
    /// inspect by hand.
    Passthrough,
    /// HMAC-SHA256 with a shared secret. Keys cannot be recomputed from
    /// tokens without the secret.
    Keyed(String),
    /// Plain SHA-256. Non-reversible but computable by anyone who knows
    /// the token.
    Unkeyed,
}

/// Derives room keys from room tokens.
///
/// Every server process must use the same mode and secret; two processes
/// hashing the same token to different keys would split one room in two.
#[derive(Debug, Clone)]
pub struct RoomHasher {
    mode: HashMode,
}

impl RoomHasher {
    pub fn new(secret: Option<String>, dev_passthrough: bool) -> Self {
        let mode = if dev_passthrough {
            HashMode::Passthrough
        } else {
            match secret.filter(|s| !s.is_empty()) {
                Some(secret) => HashMode::Keyed(secret),
                None => HashMode::Unkeyed,
            }
        };
        Self { mode }
    }

    pub fn hash(&self, token: &str) -> RoomKey {
        match &self.mode {
            HashMode::Passthrough => RoomKey::new(token),
            HashMode::Keyed(secret) => {
                let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                    .expect("HMAC accepts keys of any length");
                mac.update(token.as_bytes());
                RoomKey::new(hex::encode(mac.finalize().into_bytes()))
            }
            HashMode::Unkeyed => RoomKey::new(hex::encode(Sha256::digest(token.as_bytes()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_passthrough_keeps_raw_token() {
        let hasher = RoomHasher::new(None, true);
        assert_eq!(hasher.hash("abc123").as_str(), "abc123");
    }

    #[test]
    fn test_passthrough_wins_over_secret() {
        let hasher = RoomHasher::new(Some("sesame".to_string()), true);
        assert_eq!(hasher.hash("abc123").as_str(), "abc123");
    }

    #[test]
    fn test_unkeyed_is_sha256_hex() {
        let hasher = RoomHasher::new(None, false);
        assert_eq!(
            hasher.hash("abc123").as_str(),
            "6ca13d52ca70c883e0f0bb101e425a89e8624de51db2d2392593af6a84118090"
        );
    }

    #[test]
    fn test_keyed_is_hmac_sha256_hex() {
        let hasher = RoomHasher::new(Some("sesame".to_string()), false);
        assert_eq!(
            hasher.hash("abc123").as_str(),
            "2374808fc48b13ec1f0ffd2d590ffedadf18364953d294ea2cb40ac291743ac6"
        );
    }

    #[test]
    fn test_empty_secret_falls_back_to_unkeyed() {
        let keyed = RoomHasher::new(Some(String::new()), false);
        let unkeyed = RoomHasher::new(None, false);
        assert_eq!(keyed.hash("abc123"), unkeyed.hash("abc123"));
    }

    #[rstest]
    #[case(None)]
    #[case(Some("sesame".to_string()))]
    fn test_same_token_always_maps_to_same_key(#[case] secret: Option<String>) {
        let hasher = RoomHasher::new(secret, false);
        assert_eq!(hasher.hash("droplet"), hasher.hash("droplet"));
        assert_ne!(hasher.hash("droplet"), hasher.hash("droplet2"));
    }

    #[test]
    fn test_keyed_and_unkeyed_disagree() {
        let keyed = RoomHasher::new(Some("sesame".to_string()), false);
        let unkeyed = RoomHasher::new(None, false);
        assert_ne!(keyed.hash("abc123"), unkeyed.hash("abc123"));
    }
}
