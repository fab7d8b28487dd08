//! Contact form abuse guard
//!
//! Every captcha failure on the contact form is recorded per
//! (marketplace, submitted email, requester IP). The first failure only
//! creates the record. A repeat failure whose record is older than the
//! cooldown mails an alert to the marketplace contact address.

use super::email::{send_best_effort, Mailer, OutboundEmail};
use super::forms::ContactForm;
use crate::config::{AbusePolicy, ContactConfig};
use crate::db::repositories::ContactFormInfoRepository;
use crate::models::Marketplace;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const ALERT_SUBJECT: &str = "Contact Form, bad captcha";
pub const ALERT_CATEGORY: &str = "Error";

/// Column widths of the abuse record key, in characters
pub const EMAIL_KEY_MAX_CHARS: usize = 255;
pub const IP_KEY_MAX_CHARS: usize = 64;

/// What the guard did with one captcha failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseVerdict {
    /// No record existed for the key; one was created
    FirstOffense,
    /// Repeat failure inside the cooldown window, no alert
    WithinCooldown,
    /// Repeat failure after the cooldown, alert sent
    Alerted,
}

pub struct AbuseGuard {
    records: Arc<dyn ContactFormInfoRepository>,
    mailer: Arc<dyn Mailer>,
    cooldown: Duration,
    policy: AbusePolicy,
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "unknown"
    } else {
        value
    }
}

/// First `max_chars` characters of `value`
fn clip(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

/// Alert body listing what the failing submission contained
pub fn alert_body(ip: &str, form: &ContactForm) -> String {
    format!(
        "Bad captcha posted from {}\nUser email: {}\n\nForm info\nName: {}\nPhone: {}\nMessage: {}",
        ip,
        or_unknown(&form.email),
        or_unknown(&form.name),
        or_unknown(&form.phone),
        or_unknown(&form.message),
    )
}

impl AbuseGuard {
    pub fn new(
        records: Arc<dyn ContactFormInfoRepository>,
        mailer: Arc<dyn Mailer>,
        config: &ContactConfig,
    ) -> Self {
        Self {
            records,
            mailer,
            cooldown: Duration::try_seconds(config.abuse_cooldown_secs.max(0)).unwrap_or(Duration::MAX),
            policy: config.abuse_policy,
        }
    }

    /// Record a captcha failure of `form` sent from `ip` at `now`
    pub async fn on_captcha_failure(
        &self,
        marketplace: &Marketplace,
        form: &ContactForm,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<AbuseVerdict> {
        let email = clip(&form.email, EMAIL_KEY_MAX_CHARS);
        let key_ip = clip(ip, IP_KEY_MAX_CHARS);
        let (record, created) = self
            .records
            .get_or_create(marketplace.id, email, key_ip, now)
            .await?;
        if created {
            tracing::debug!(marketplace = %marketplace.slug, ip, "First contact form captcha failure");
            return Ok(AbuseVerdict::FirstOffense);
        }

        let cooled_down = now
            .checked_sub_signed(self.cooldown)
            .map_or(false, |cutoff| record.datetime < cutoff);
        if self.policy == AbusePolicy::Refresh {
            self.records.touch(record.id, now).await?;
        }
        if !cooled_down {
            return Ok(AbuseVerdict::WithinCooldown);
        }

        tracing::warn!(marketplace = %marketplace.slug, ip, "Repeated contact form captcha failure");
        let alert = OutboundEmail {
            subject: ALERT_SUBJECT.to_string(),
            body: alert_body(ip, form),
            to: vec![marketplace.contact_email.clone()],
            smtp_category: Some(ALERT_CATEGORY.to_string()),
        };
        send_best_effort(self.mailer.as_ref(), &alert).await;
        Ok(AbuseVerdict::Alerted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxContactFormInfoRepository;
    use crate::test_support::{Fixture, RecordingMailer};

    fn guard(fx: &Fixture, mailer: Arc<RecordingMailer>, policy: AbusePolicy) -> AbuseGuard {
        AbuseGuard::new(
            SqlxContactFormInfoRepository::boxed(fx.pool.clone()),
            mailer,
            &ContactConfig {
                abuse_cooldown_secs: 120,
                abuse_policy: policy,
            },
        )
    }

    fn form() -> ContactForm {
        ContactForm {
            name: "Mallory".to_string(),
            email: "mallory@example.com".to_string(),
            phone: String::new(),
            message: "Buy cheap watches".to_string(),
            captcha_token: String::new(),
            captcha: "12".to_string(),
        }
    }

    #[test]
    fn test_alert_body_fills_unknown() {
        let mut f = form();
        f.message = "  ".to_string();
        assert_eq!(
            alert_body("10.0.0.1", &f),
            "Bad captcha posted from 10.0.0.1\nUser email: mallory@example.com\n\n\
             Form info\nName: Mallory\nPhone: unknown\nMessage: unknown"
        );
    }

    #[tokio::test]
    async fn test_first_failure_records_without_alert() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);

        let verdict = g.on_captcha_failure(&coins, &form(), "10.0.0.1", Utc::now()).await.unwrap();
        assert_eq!(verdict, AbuseVerdict::FirstOffense);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_within_cooldown_is_quiet() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);
        let t0 = Utc::now();

        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0).await.unwrap();
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::WithinCooldown);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_after_cooldown_alerts_once() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);
        let t0 = Utc::now();

        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0).await.unwrap();
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(121))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::Alerted);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, ALERT_SUBJECT);
        assert_eq!(sent[0].to, vec![coins.contact_email.clone()]);
        assert_eq!(sent[0].smtp_category.as_deref(), Some("Error"));
        assert!(sent[0].body.starts_with("Bad captcha posted from 10.0.0.1\n"));
        assert!(sent[0].body.contains("Phone: unknown"));
    }

    #[tokio::test]
    async fn test_literal_policy_keeps_first_offense_time() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);
        let t0 = Utc::now();

        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0).await.unwrap();
        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(200)).await.unwrap();
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(210))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::Alerted);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_policy_restamps_record() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Refresh);
        let t0 = Utc::now();

        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0).await.unwrap();
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(200))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::Alerted);
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::seconds(210))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::WithinCooldown);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("abc", 5), "abc");
        assert_eq!(clip("abcdef", 3), "abc");
        assert_eq!(clip("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn test_oversized_key_parts_are_clipped() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);
        let t0 = Utc::now();

        let mut long = form();
        long.email = format!("{}@example.com", "m".repeat(300));
        let long_ip = "203.0.113.9, ".repeat(20);

        assert_eq!(
            g.on_captcha_failure(&coins, &long, &long_ip, t0).await.unwrap(),
            AbuseVerdict::FirstOffense
        );
        // Same clipped key, so the repeat is recognised
        assert_eq!(
            g.on_captcha_failure(&coins, &long, &long_ip, t0 + Duration::seconds(10))
                .await
                .unwrap(),
            AbuseVerdict::WithinCooldown
        );

        let repo = SqlxContactFormInfoRepository::new(fx.pool.clone());
        let stored = repo
            .get(coins.id, clip(&long.email, EMAIL_KEY_MAX_CHARS), clip(&long_ip, IP_KEY_MAX_CHARS))
            .await
            .unwrap()
            .expect("clipped record");
        assert_eq!(stored.email.chars().count(), EMAIL_KEY_MAX_CHARS);
        assert_eq!(stored.ip.chars().count(), IP_KEY_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_huge_cooldown_never_alerts() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = AbuseGuard::new(
            SqlxContactFormInfoRepository::boxed(fx.pool.clone()),
            mailer.clone(),
            &ContactConfig {
                abuse_cooldown_secs: i64::MAX,
                abuse_policy: AbusePolicy::Literal,
            },
        );
        let t0 = Utc::now();

        g.on_captcha_failure(&coins, &form(), "10.0.0.1", t0).await.unwrap();
        let verdict = g
            .on_captcha_failure(&coins, &form(), "10.0.0.1", t0 + Duration::days(365))
            .await
            .unwrap();
        assert_eq!(verdict, AbuseVerdict::WithinCooldown);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_email_keys_on_empty_string() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let g = guard(&fx, mailer.clone(), AbusePolicy::Literal);
        let t0 = Utc::now();
        let anonymous = ContactForm::default();

        assert_eq!(
            g.on_captcha_failure(&coins, &anonymous, "10.0.0.2", t0).await.unwrap(),
            AbuseVerdict::FirstOffense
        );
        // another IP is a separate key
        assert_eq!(
            g.on_captcha_failure(&coins, &anonymous, "10.0.0.3", t0).await.unwrap(),
            AbuseVerdict::FirstOffense
        );
        g.on_captcha_failure(&coins, &anonymous, "10.0.0.2", t0 + Duration::seconds(300))
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].body,
            "Bad captcha posted from 10.0.0.2\nUser email: unknown\n\n\
             Form info\nName: unknown\nPhone: unknown\nMessage: unknown"
        );
    }
}
