//! Confirmation-token cache for destructive operations (§4.F): a small
//! TTL map behind a single mutex — not a distributed token store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789"; // no 0/O/1/I
const TOKEN_LEN: usize = 6;
const MAX_TOKENS: usize = 10_000;

fn generate_token_string() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

struct Entry {
    operation: String,
    issued_at: Instant,
}

/// Single-process, single-mutex TTL cache binding a token to the
/// operation name it was issued for. Tokens are single-use: a
/// successful [`TokenCache::validate_and_consume`] removes the entry.
pub struct TokenCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn evict_expired(entries: &mut HashMap<String, Entry>, ttl: Duration) {
        let now = Instant::now();
        entries.retain(|_, e| now.duration_since(e.issued_at) < ttl);
    }

    /// Issues a fresh token bound to `operation`, evicting expired
    /// entries first and the oldest entry if at capacity.
    pub async fn generate(&self, operation: &str) -> String {
        let mut entries = self.entries.lock().await;
        Self::evict_expired(&mut entries, self.ttl);

        if entries.len() >= MAX_TOKENS {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.issued_at)
                .map(|(token, _)| token.clone())
            {
                entries.remove(&oldest);
            }
        }

        let token = generate_token_string();
        entries.insert(token.clone(), Entry { operation: operation.to_string(), issued_at: Instant::now() });
        token
    }

    /// Consumes `token` if it is unexpired and bound to `operation`.
    /// Single-use: the entry is removed whether or not it matches, so a
    /// replay is always rejected.
    pub async fn validate_and_consume(&self, operation: &str, token: &str) -> bool {
        let mut entries = self.entries.lock().await;
        Self::evict_expired(&mut entries, self.ttl);

        match entries.remove(token) {
            Some(entry) => entry.operation == operation,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_round_trip() {
        let cache = TokenCache::new(Duration::from_secs(300));
        let token = cache.generate("reset_hard").await;
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(cache.validate_and_consume("reset_hard", &token).await);
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let cache = TokenCache::new(Duration::from_secs(300));
        let token = cache.generate("clean_fd").await;
        assert!(cache.validate_and_consume("clean_fd", &token).await);
        assert!(!cache.validate_and_consume("clean_fd", &token).await);
    }

    #[tokio::test]
    async fn token_operation_must_match() {
        let cache = TokenCache::new(Duration::from_secs(300));
        let token = cache.generate("reset_hard").await;
        assert!(!cache.validate_and_consume("branch_delete", &token).await);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let cache = TokenCache::new(Duration::from_millis(10));
        let token = cache.generate("reset_hard").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.validate_and_consume("reset_hard", &token).await);
    }
}
