use std::net::IpAddr;
use std::num::{NonZeroU32, NonZeroUsize};

use chrono::{DateTime, Duration, Utc};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use lru::LruCache;
use parking_lot::RwLock;

use crate::config::UnlockConfig;
use crate::error::AppError;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(v) => v,
    None => unreachable!(),
};

/// Failure tracking is per client address and document. The viewer cookie
/// is client-chosen, so it never takes part in the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PenaltyKey {
    client: IpAddr,
    document_id: String,
}

impl PenaltyKey {
    fn new(client: IpAddr, document_id: &str) -> Self {
        Self {
            client,
            document_id: document_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PenaltyEntry {
    failures: u32,
    last_failure: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
}

/// Hardening of the unlock endpoints.
///
/// Two independent limits, each disabled with `0`:
/// - after `max_failures` incorrect codes in a row for one document, a client
///   is refused until `lockout` has elapsed; a correct code clears the count;
/// - every client may submit at most `attempts_per_minute` codes, across all
///   documents.
///
/// Penalty state lives in a bounded LRU, so a flood of distinct clients
/// evicts the oldest entries instead of growing without limit.
pub struct UnlockThrottle {
    max_failures: u32,
    lockout: Duration,
    penalties: RwLock<LruCache<PenaltyKey, PenaltyEntry>>,
    attempts: Option<DefaultKeyedRateLimiter<IpAddr>>,
}

impl UnlockThrottle {
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            max_failures,
            lockout,
            penalties: RwLock::new(LruCache::new(DEFAULT_CAPACITY)),
            attempts: None,
        }
    }

    pub fn from_config(config: &UnlockConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_tracked_clients).unwrap_or(DEFAULT_CAPACITY);
        let attempts = NonZeroU32::new(config.attempts_per_minute)
            .map(|n| RateLimiter::keyed(Quota::per_minute(n)));

        Self {
            max_failures: config.max_failed_attempts,
            lockout: Duration::seconds(config.lockout_seconds),
            penalties: RwLock::new(LruCache::new(capacity)),
            attempts,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::zero())
    }

    pub fn is_enabled(&self) -> bool {
        self.max_failures > 0 || self.attempts.is_some()
    }

    /// Admit one code submission, or fail with `TooManyAttempts`.
    ///
    /// Counts against the per-client attempt rate even when the code later
    /// turns out to be correct.
    pub fn check(
        &self,
        client: IpAddr,
        document_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.max_failures > 0 {
            let key = PenaltyKey::new(client, document_id);
            let locked_until = self.penalties.read().peek(&key).and_then(|e| e.locked_until);
            match locked_until {
                Some(until) if now < until => {
                    let wait = (until - now).num_seconds().max(1);
                    tracing::warn!(%client, document_id, "Unlock refused during lockout");
                    return Err(AppError::TooManyAttempts(format!(
                        "Too many incorrect codes, try again in {} seconds",
                        wait
                    )));
                }
                Some(_) => {
                    // Lockout over, start counting afresh
                    self.penalties.write().pop(&key);
                }
                None => {}
            }
        }

        if let Some(limiter) = &self.attempts {
            if let Err(not_until) = limiter.check_key(&client) {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                tracing::warn!(%client, "Unlock attempt rate exceeded");
                return Err(AppError::TooManyAttempts(format!(
                    "Too many codes submitted, try again in {} seconds",
                    wait.as_secs().max(1)
                )));
            }
        }

        Ok(())
    }

    /// Count an incorrect code; starts a lockout once the limit is reached.
    pub fn record_failure(&self, client: IpAddr, document_id: &str, now: DateTime<Utc>) {
        if self.max_failures == 0 {
            return;
        }

        let mut penalties = self.penalties.write();
        let key = PenaltyKey::new(client, document_id);
        let entry = penalties.get_or_insert_mut(key, PenaltyEntry::default);
        entry.failures += 1;
        entry.last_failure = Some(now);
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now + self.lockout);
        }
    }

    /// A correct code for a gated unit clears the failure count.
    pub fn record_success(&self, client: IpAddr, document_id: &str) {
        if self.max_failures == 0 {
            return;
        }
        self.penalties
            .write()
            .pop(&PenaltyKey::new(client, document_id));
    }

    /// Drop expired lockouts and failure counts older than one lockout
    /// period. Returns the number of removed entries.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        if let Some(limiter) = &self.attempts {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }

        let mut penalties = self.penalties.write();
        let stale: Vec<PenaltyKey> = penalties
            .iter()
            .filter(|(_, entry)| match entry.locked_until {
                Some(until) => until <= now,
                None => entry
                    .last_failure
                    .map_or(true, |at| at + self.lockout <= now),
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            penalties.pop(key);
        }
        stale.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.penalties.read().len()
    }
}
