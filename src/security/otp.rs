//! One-time passwords and backup codes for the two-factor flow.
//!
//! # State per subject
//! ```text
//! absent → issued → verified | expired | exhausted → absent
//! ```
//!
//! Every failure mode reports plain `false`; callers cannot tell an expired
//! code from a wrong one.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::config::OtpConfig;
use crate::observability::metrics;

/// Log target of the delivery line. It sits under the crate prefix, so the
/// default filter keeps it.
pub const DELIVERY_TARGET: &str = "storefront_perimeter::otp_delivery";

/// Out-of-band channel that hands an issued code to its subject.
pub trait OtpDelivery: Send + Sync {
    fn deliver(&self, subject: &str, code: &str);
}

/// Writes issued codes to the delivery log.
#[derive(Debug, Default)]
pub struct LogDelivery;

impl OtpDelivery for LogDelivery {
    fn deliver(&self, subject: &str, code: &str) {
        tracing::info!(target: DELIVERY_TARGET, subject = %subject, code = %code, "OTP issued");
    }
}

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

#[derive(Debug, Clone)]
struct OtpRecord {
    code: String,
    expires_at: Instant,
    attempts: u32,
}

/// Process-wide OTP store.
#[derive(Debug)]
pub struct OtpService {
    records: DashMap<String, OtpRecord>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpService {
    pub fn new(config: &OtpConfig) -> Self {
        Self {
            records: DashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_attempts: config.max_attempts,
        }
    }

    /// Issue a fresh 6-digit code for `subject`, replacing any outstanding one.
    pub fn issue(&self, subject: &str) -> String {
        let code = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string();
        self.records.insert(
            subject.to_string(),
            OtpRecord {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
                attempts: 0,
            },
        );
        code
    }

    /// Check `candidate` against the outstanding code for `subject`.
    pub fn verify(&self, subject: &str, candidate: &str) -> bool {
        let now = Instant::now();

        let Entry::Occupied(mut entry) = self.records.entry(subject.to_string()) else {
            metrics::record_otp_verification("absent");
            return false;
        };

        if now >= entry.get().expires_at {
            entry.remove();
            metrics::record_otp_verification("expired");
            return false;
        }

        let record = entry.get_mut();
        record.attempts += 1;
        if record.attempts > self.max_attempts {
            entry.remove();
            tracing::warn!(subject = %subject, "Too many OTP attempts, code discarded");
            metrics::record_otp_verification("exhausted");
            return false;
        }

        if record.code == candidate {
            entry.remove();
            metrics::record_otp_verification("verified");
            return true;
        }

        metrics::record_otp_verification("mismatch");
        false
    }

    /// Drop records whose lifetime has passed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, r| now < r.expires_at);
        before.saturating_sub(self.records.len())
    }

    /// Outstanding records, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `count` independent codes of 8 uppercase hex characters (4 random bytes).
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rng.fill_bytes(&mut bytes);
            hex::encode_upper(bytes)
        })
        .collect()
}

/// One-way digest of a backup code for storage and comparison.
pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hashed backup codes per subject. Plaintext never enters the vault.
#[derive(Debug, Default)]
pub struct BackupCodeVault {
    hashes: DashMap<String, Vec<String>>,
}

impl BackupCodeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh set for `subject`, replacing the previous set.
    /// Returns the plaintext codes for one-time display.
    pub fn regenerate(&self, subject: &str, count: usize) -> Vec<String> {
        let codes = generate_backup_codes(count);
        let hashes = codes.iter().map(|c| hash_backup_code(c)).collect();
        self.hashes.insert(subject.to_string(), hashes);
        codes
    }

    /// Consume a matching code. Each code redeems at most once.
    pub fn redeem(&self, subject: &str, code: &str) -> bool {
        let digest = hash_backup_code(&code.trim().to_ascii_uppercase());
        let Some(mut hashes) = self.hashes.get_mut(subject) else {
            return false;
        };
        match hashes.iter().position(|h| *h == digest) {
            Some(i) => {
                hashes.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn remaining(&self, subject: &str) -> usize {
        self.hashes.get(subject).map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn service() -> OtpService {
        OtpService::new(&OtpConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_shape() {
        let otp = service();
        for _ in 0..50 {
            let code = otp.issue("user");
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((CODE_MIN..=CODE_MAX).contains(&n));
        }
        assert_eq!(otp.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_code_verifies_once() {
        let otp = service();
        let code = otp.issue("user");
        assert!(otp.verify("user", &code));
        assert!(!otp.verify("user", &code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_discards_code() {
        let otp = service();
        let code = otp.issue("user");
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for _ in 0..4 {
            assert!(!otp.verify("user", wrong));
        }
        assert!(!otp.verify("user", &code));
        assert!(otp.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_attempt_fails_even_when_correct() {
        let otp = service();
        let code = otp.issue("user");
        let wrong = if code == "123456" { "654321" } else { "123456" };

        for _ in 0..3 {
            assert!(!otp.verify("user", wrong));
        }
        assert!(!otp.verify("user", &code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_attempt_may_still_succeed() {
        let otp = service();
        let code = otp.issue("user");
        let wrong = if code == "123456" { "654321" } else { "123456" };

        assert!(!otp.verify("user", wrong));
        assert!(!otp.verify("user", wrong));
        assert!(otp.verify("user", &code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let otp = service();
        let code = otp.issue("user");

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(!otp.verify("user", &code));
        assert!(otp.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reissue_overwrites() {
        let otp = service();
        let first = otp.issue("user");
        let second = otp.issue("user");
        if first != second {
            assert!(!otp.verify("user", &first));
        }
        assert!(otp.verify("user", &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_subject() {
        assert!(!service().verify("nobody", "123456"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired() {
        let otp = service();
        otp.issue("a");
        tokio::time::advance(Duration::from_secs(200)).await;
        otp.issue("b");
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(otp.sweep(), 1);
        assert_eq!(otp.len(), 1);
    }

    #[test]
    fn test_concurrent_wrong_guesses_are_all_counted() {
        let otp = Arc::new(service());
        let code = otp.issue("user");
        let wrong = if code == "123456" { "654321" } else { "123456" };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let otp = otp.clone();
                std::thread::spawn(move || otp.verify("user", wrong))
            })
            .collect();
        for h in handles {
            assert!(!h.join().unwrap());
        }

        assert!(!otp.verify("user", &code));
    }

    #[test]
    fn test_backup_codes_shape() {
        let codes = generate_backup_codes(10);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_hash_is_stable_sha256_hex() {
        let digest = hash_backup_code("ABCD1234");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_backup_code("ABCD1234"));
        assert_ne!(digest, hash_backup_code("ABCD1235"));
    }

    #[test]
    fn test_vault_redeems_each_code_once() {
        let vault = BackupCodeVault::new();
        let codes = vault.regenerate("user", 3);
        assert_eq!(vault.remaining("user"), 3);

        assert!(vault.redeem("user", &codes[1].to_lowercase()));
        assert!(!vault.redeem("user", &codes[1]));
        assert_eq!(vault.remaining("user"), 2);
        assert!(!vault.redeem("other", &codes[0]));
    }
}
