//! Scannable tokens for physical units.
//!
//! Long form: `<PREFIX>-<time base36>-<6 random symbols>`, printed as a QR code.
//! Short form: 6 random symbols, typed by hand when a label cannot be scanned.
//!
//! Symbols come from a 32-character alphabet without the look-alikes 0/O and
//! 1/I. Short tokens are not globally unique by construction; inserting them
//! and retrying on conflict is the ledger's job.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const DEFAULT_SCAN_PREFIX: &str = "QR";
pub const RANDOM_SEGMENT_LEN: usize = 6;

/// Last time segment handed out by this process (milliseconds since epoch).
static LAST_TIME_SEGMENT: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wrap an externally supplied token (e.g. a scanned code).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Token factory with a configurable long-form prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGenerator {
    prefix: String,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_PREFIX)
    }
}

impl TokenGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn scan_token(&self) -> Token {
        let time = to_base36(next_time_segment());
        let random = random_code(&mut rand::thread_rng());
        Token(format!("{}-{time}-{random}", self.prefix))
    }

    pub fn short_token(&self) -> Token {
        Token(random_code(&mut rand::thread_rng()))
    }
}

/// Long-form token with the default prefix.
pub fn generate_scan_token() -> Token {
    TokenGenerator::default().scan_token()
}

/// Bare 6-symbol code for manual entry.
pub fn generate_short_token() -> Token {
    TokenGenerator::default().short_token()
}

/// True if `code` has the shape of a short token.
pub fn is_short_code(code: &str) -> bool {
    code.len() == RANDOM_SEGMENT_LEN && code.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

/// Wall-clock milliseconds, bumped so that no two calls in this process
/// ever observe the same value.
fn next_time_segment() -> u64 {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let mut last = LAST_TIME_SEGMENT.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_TIME_SEGMENT.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

fn random_code(rng: &mut impl Rng) -> String {
    (0..RANDOM_SEGMENT_LEN)
        .map(|_| char::from(TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())]))
        .collect()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::with_capacity(13);
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scan_token_has_prefix_time_and_random_segments() {
        let token = generate_scan_token();
        let parts: Vec<&str> = token.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "QR");
        assert!(u64::from_str_radix(parts[1], 36).is_ok());
        assert!(is_short_code(parts[2]));
    }

    #[test]
    fn custom_prefix_is_used() {
        let token = TokenGenerator::new("LOT").scan_token();
        assert!(token.as_str().starts_with("LOT-"));
    }

    #[test]
    fn short_token_avoids_confusable_symbols() {
        for _ in 0..500 {
            let token = generate_short_token();
            assert!(is_short_code(token.as_str()));
            assert!(!token.as_str().contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn time_segment_strictly_increases() {
        let mut last = next_time_segment();
        for _ in 0..10_000 {
            let next = next_time_segment();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn base36_matches_std_parse() {
        for n in [0u64, 35, 36, 1_700_000_000_000, u64::MAX] {
            assert_eq!(u64::from_str_radix(&to_base36(n), 36).unwrap(), n);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 16,
            ..ProptestConfig::default()
        })]

        #[test]
        fn scan_tokens_are_unique(n in 1usize..5_000) {
            let generator = TokenGenerator::default();
            let tokens: HashSet<Token> = (0..n).map(|_| generator.scan_token()).collect();
            prop_assert_eq!(tokens.len(), n);
        }
    }
}
