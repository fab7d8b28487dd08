//! Contact form captcha
//!
//! A stateless arithmetic challenge. The expected answer is never sent to
//! the browser; the hidden token carries the expiry, a nonce and an
//! HMAC-SHA256 over `answer:expires:nonce`, so verification needs only the
//! server secret. A correctly answered token is spent: its nonce is kept in
//! a moka set until the token could no longer verify anyway.

use crate::config::{CaptchaConfig, MAX_CAPTCHA_TTL_SECS};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use moka::sync::Cache;
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on remembered spent nonces
const SPENT_NONCES_CAPACITY: u64 = 100_000;

/// Slack added to the spent-nonce lifetime for clock drift between issue
/// and verification
const SPENT_NONCE_GRACE_SECS: u64 = 60;

/// Challenge shown on the contact form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptchaChallenge {
    pub question: String,
    /// Value of the hidden `captcha_token` field
    pub token: String,
}

pub struct CaptchaService {
    mac: HmacSha256,
    ttl: Duration,
    spent: Cache<String, ()>,
}

impl CaptchaService {
    pub fn new(config: &CaptchaConfig) -> Result<Self> {
        let secret = match &config.secret {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                tracing::warn!("No captcha secret configured, challenges will not survive a restart");
                let mut random = Uuid::new_v4().as_bytes().to_vec();
                random.extend_from_slice(Uuid::new_v4().as_bytes());
                random
            }
        };
        let mac = HmacSha256::new_from_slice(&secret)
            .map_err(|e| anyhow!("Invalid captcha secret: {}", e))?;

        if !(1..=MAX_CAPTCHA_TTL_SECS).contains(&config.ttl_seconds) {
            bail!("Captcha TTL out of range: {} seconds", config.ttl_seconds);
        }
        let ttl = Duration::try_seconds(config.ttl_seconds)
            .ok_or_else(|| anyhow!("Captcha TTL out of range: {} seconds", config.ttl_seconds))?;

        let spent = Cache::builder()
            .max_capacity(SPENT_NONCES_CAPACITY)
            .time_to_live(std::time::Duration::from_secs(
                config.ttl_seconds.unsigned_abs() + SPENT_NONCE_GRACE_SECS,
            ))
            .build();

        Ok(Self { mac, ttl, spent })
    }

    pub fn issue(&self) -> CaptchaChallenge {
        self.issue_at(Utc::now())
    }

    pub fn issue_at(&self, now: DateTime<Utc>) -> CaptchaChallenge {
        let nonce = Uuid::new_v4();
        let bytes = nonce.as_bytes();
        let (a, b) = (i64::from(bytes[0] % 10) + 1, i64::from(bytes[1] % 10) + 1);
        let expires = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .timestamp();
        let nonce = nonce.simple().to_string();
        let signature = self.sign(a + b, expires, &nonce);

        CaptchaChallenge {
            question: format!("What is {} plus {}?", a, b),
            token: format!("{}.{}.{}", expires, nonce, HEXLOWER.encode(&signature)),
        }
    }

    pub fn verify(&self, token: &str, answer: &str) -> bool {
        self.verify_at(token, answer, Utc::now())
    }

    /// Check `answer` against `token`. A token verifies at most once.
    pub fn verify_at(&self, token: &str, answer: &str, now: DateTime<Utc>) -> bool {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(expires), Some(nonce), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        let Ok(expires) = expires.parse::<i64>() else {
            return false;
        };
        if now.timestamp() > expires {
            return false;
        }
        let Ok(answer) = answer.trim().parse::<i64>() else {
            return false;
        };
        let Ok(signature) = HEXLOWER.decode(signature.as_bytes()) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(Self::message(answer, expires, nonce).as_bytes());
        if mac.verify_slice(&signature).is_err() {
            return false;
        }

        let fresh = self.spent.entry(nonce.to_string()).or_insert(()).is_fresh();
        if !fresh {
            tracing::debug!("Captcha token replayed");
        }
        fresh
    }

    fn sign(&self, answer: i64, expires: i64, nonce: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(Self::message(answer, expires, nonce).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn message(answer: i64, expires: i64, nonce: &str) -> String {
        format!("{}:{}:{}", answer, expires, nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CaptchaService {
        CaptchaService::new(&CaptchaConfig {
            secret: Some("test-secret".to_string()),
            ttl_seconds: 60,
        })
        .unwrap()
    }

    /// Work out the answer from the question text
    fn solve(challenge: &CaptchaChallenge) -> i64 {
        let numbers: Vec<i64> = challenge
            .question
            .trim_end_matches('?')
            .split_whitespace()
            .filter_map(|w| w.parse().ok())
            .collect();
        numbers.iter().sum()
    }

    #[test]
    fn test_correct_answer_verifies() {
        let captcha = service();
        let challenge = captcha.issue();
        let answer = format!(" {} ", solve(&challenge));
        assert!(captcha.verify(&challenge.token, &answer));
    }

    #[test]
    fn test_solved_token_cannot_be_replayed() {
        let captcha = service();
        let challenge = captcha.issue();
        let answer = solve(&challenge).to_string();

        assert!(captcha.verify(&challenge.token, &answer));
        for _ in 0..4 {
            assert!(!captcha.verify(&challenge.token, &answer));
        }

        let next = captcha.issue();
        assert!(captcha.verify(&next.token, &solve(&next).to_string()));
    }

    #[test]
    fn test_wrong_answer_does_not_spend_token() {
        let captcha = service();
        let challenge = captcha.issue();
        let answer = solve(&challenge);

        assert!(!captcha.verify(&challenge.token, &(answer + 1).to_string()));
        assert!(captcha.verify(&challenge.token, &answer.to_string()));
    }

    #[test]
    fn test_ttl_out_of_range_is_rejected() {
        for ttl_seconds in [0, -1, MAX_CAPTCHA_TTL_SECS + 1, i64::MAX] {
            let result = CaptchaService::new(&CaptchaConfig {
                secret: Some("test-secret".to_string()),
                ttl_seconds,
            });
            assert!(result.is_err(), "{}", ttl_seconds);
        }
    }

    #[test]
    fn test_wrong_answer_fails() {
        let captcha = service();
        let challenge = captcha.issue();
        let wrong = (solve(&challenge) + 1).to_string();
        assert!(!captcha.verify(&challenge.token, &wrong));
        assert!(!captcha.verify(&challenge.token, "seven"));
        assert!(!captcha.verify(&challenge.token, ""));
    }

    #[test]
    fn test_expired_token_fails() {
        let captcha = service();
        let issued = Utc::now();
        let challenge = captcha.issue_at(issued);
        let answer = solve(&challenge).to_string();
        assert!(!captcha.verify_at(&challenge.token, &answer, issued + Duration::seconds(61)));
        assert!(captcha.verify_at(&challenge.token, &answer, issued + Duration::seconds(60)));
    }

    #[test]
    fn test_tampered_or_foreign_token_fails() {
        let captcha = service();
        let challenge = captcha.issue();
        let answer = solve(&challenge).to_string();

        let mut parts: Vec<&str> = challenge.token.split('.').collect();
        let later = (parts[0].parse::<i64>().unwrap() + 3600).to_string();
        parts[0] = &later;
        assert!(!captcha.verify(&parts.join("."), &answer));

        let other = CaptchaService::new(&CaptchaConfig {
            secret: Some("another-secret".to_string()),
            ttl_seconds: 60,
        })
        .unwrap();
        assert!(!other.verify(&challenge.token, &answer));

        assert!(!captcha.verify("garbage", &answer));
        assert!(!captcha.verify("", &answer));
    }

    #[test]
    fn test_random_secret_when_unconfigured() {
        let captcha = CaptchaService::new(&CaptchaConfig::default()).unwrap();
        let challenge = captcha.issue();
        assert!(captcha.verify(&challenge.token, &solve(&challenge).to_string()));
    }
}
