use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

const DEFAULT_CHALLENGE_COUNT: usize = 50;
const DEFAULT_SALT_SIZE: usize = 32;
const DEFAULT_DIFFICULTY: usize = 4;
const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(20 * 60);

/// Proof-of-work challenge handed to the client: for every `(salt, target)`
/// pair the solver must find a nonce with `sha256(salt + nonce)` starting
/// with `target` (hex).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub token: String,
    pub challenge: Vec<(String, String)>,
    /// unix millis
    pub expires: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub token: String,
    pub solutions: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl Redemption {
    fn failure() -> Self {
        Self {
            success: false,
            token: None,
            expires: None,
        }
    }
}

#[derive(Debug)]
struct PendingChallenge {
    pairs: Vec<(String, String)>,
    expires_at: Instant,
}

/// CAPTCHA-style gate in front of the login flow.
///
/// Challenges are one-shot: redemption removes the stored state before
/// verification, so a second redemption fails even with correct solutions.
/// Redeemed verification tokens are single-use as well and are stored hashed.
/// All expiry is checked lazily on access.
#[derive(Debug)]
pub struct PuzzleGate {
    challenge_count: usize,
    salt_size: usize,
    difficulty: usize,
    challenge_ttl: Duration,
    token_ttl: Duration,
    challenges: DashMap<String, PendingChallenge>,
    tokens: DashMap<String, Instant>,
}

impl Default for PuzzleGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PuzzleGate {
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(
            DEFAULT_CHALLENGE_COUNT,
            DEFAULT_SALT_SIZE,
            DEFAULT_DIFFICULTY,
            DEFAULT_CHALLENGE_TTL,
            DEFAULT_TOKEN_TTL,
        )
    }

    #[must_use]
    pub fn with_params(
        challenge_count: usize,
        salt_size: usize,
        difficulty: usize,
        challenge_ttl: Duration,
        token_ttl: Duration,
    ) -> Self {
        Self {
            challenge_count,
            salt_size,
            difficulty,
            challenge_ttl,
            token_ttl,
            challenges: DashMap::new(),
            tokens: DashMap::new(),
        }
    }

    #[must_use]
    pub fn create_challenge(&self) -> Challenge {
        self.sweep();
        let token = rand_hex(25);
        let pairs: Vec<(String, String)> = (0..self.challenge_count)
            .map(|_| (rand_hex(self.salt_size), rand_hex(self.difficulty)))
            .collect();
        self.challenges.insert(
            token.clone(),
            PendingChallenge {
                pairs: pairs.clone(),
                expires_at: Instant::now() + self.challenge_ttl,
            },
        );
        Challenge {
            token,
            challenge: pairs,
            expires: epoch_ms_after(self.challenge_ttl),
        }
    }

    /// Redeems a solved challenge for a one-shot verification token.
    #[must_use]
    pub fn redeem(&self, solution: &Solution) -> Redemption {
        // remove first: a challenge can be redeemed at most once
        let Some((_, pending)) = self.challenges.remove(&solution.token) else {
            debug!("puzzle redemption for unknown challenge");
            return Redemption::failure();
        };
        if pending.expires_at <= Instant::now() {
            debug!("puzzle redemption for expired challenge");
            return Redemption::failure();
        }
        if solution.solutions.len() != pending.pairs.len() {
            return Redemption::failure();
        }
        for ((salt, target), nonce) in pending.pairs.iter().zip(&solution.solutions) {
            let digest = hex::encode(Sha256::digest(format!("{salt}{nonce}")));
            if !digest.starts_with(target.as_str()) {
                return Redemption::failure();
            }
        }

        let vertoken = format!("{}:{}", rand_hex(16), rand_hex(32));
        self.tokens.insert(
            hex::encode(Sha256::digest(&vertoken)),
            Instant::now() + self.token_ttl,
        );
        Redemption {
            success: true,
            token: Some(vertoken),
            expires: Some(epoch_ms_after(self.token_ttl)),
        }
    }

    /// Drops expired entries so abandoned challenges and unconsumed
    /// verification tokens do not accumulate across the process lifetime.
    fn sweep(&self) {
        let now = Instant::now();
        self.challenges.retain(|_, pending| pending.expires_at > now);
        self.tokens.retain(|_, expires_at| *expires_at > now);
    }

    /// Consumes a verification token. Unknown, expired, and already-used
    /// tokens all report `false`.
    #[must_use]
    pub fn validate_token(&self, cap_token: &str) -> bool {
        let key = hex::encode(Sha256::digest(cap_token));
        match self.tokens.remove(&key) {
            Some((_, expires_at)) => expires_at > Instant::now(),
            None => false,
        }
    }
}

fn rand_hex(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

fn epoch_ms_after(ttl: Duration) -> i64 {
    Utc::now()
        .timestamp_millis()
        .saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Brute-forces a challenge the way a client-side solver would. Only
/// reasonable with a small difficulty; used by tests and demos.
#[must_use]
pub fn solve(challenge: &Challenge) -> Solution {
    let solutions = challenge
        .challenge
        .iter()
        .map(|(salt, target)| {
            (0_u64..)
                .find(|nonce| {
                    hex::encode(Sha256::digest(format!("{salt}{nonce}"))).starts_with(target)
                })
                .unwrap_or(0)
        })
        .collect();
    Solution {
        token: challenge.token.clone(),
        solutions,
    }
}
