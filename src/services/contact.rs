//! Contact-us form

use super::abuse_guard::AbuseGuard;
use super::captcha::CaptchaService;
use super::email::{send_best_effort, Mailer, OutboundEmail};
use super::forms::{ContactForm, FormErrors};
use crate::config::StaffContact;
use crate::models::Marketplace;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const CONTACT_CATEGORY: &str = "Contact Form";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactOutcome {
    Sent,
    Invalid(FormErrors),
}

pub struct ContactService {
    captcha: Arc<CaptchaService>,
    guard: AbuseGuard,
    mailer: Arc<dyn Mailer>,
    staff: Vec<StaffContact>,
}

/// Message mailed for a valid submission
pub fn contact_message(marketplace: &Marketplace, form: &ContactForm, staff: &[StaffContact]) -> OutboundEmail {
    let mut to: Vec<String> = staff.iter().map(|s| s.email.clone()).collect();
    to.push(marketplace.contact_email.clone());

    OutboundEmail {
        subject: format!("Contact Form From {}", marketplace),
        body: format!(
            "Message from {} (email {}, phone {}).\n{}",
            form.name.trim(),
            form.email.trim(),
            form.phone.trim(),
            form.message.trim()
        ),
        to,
        smtp_category: Some(CONTACT_CATEGORY.to_string()),
    }
}

impl ContactService {
    pub fn new(
        captcha: Arc<CaptchaService>,
        guard: AbuseGuard,
        mailer: Arc<dyn Mailer>,
        staff: Vec<StaffContact>,
    ) -> Self {
        Self {
            captcha,
            guard,
            mailer,
            staff,
        }
    }

    pub fn captcha(&self) -> &CaptchaService {
        &self.captcha
    }

    /// Validate and deliver a submission sent from `ip`
    pub async fn submit(
        &self,
        marketplace: &Marketplace,
        form: &ContactForm,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<ContactOutcome> {
        let captcha_ok = self.captcha.verify_at(&form.captcha_token, &form.captcha, now);
        let errors = form.validate(captcha_ok);

        if errors.is_empty() {
            let message = contact_message(marketplace, form, &self.staff);
            send_best_effort(self.mailer.as_ref(), &message).await;
            tracing::info!(marketplace = %marketplace.slug, "Contact form sent");
            return Ok(ContactOutcome::Sent);
        }

        if errors.has("captcha") {
            if let Err(e) = self.guard.on_captcha_failure(marketplace, form, ip, now).await {
                tracing::warn!(marketplace = %marketplace.slug, ip, "Failed to record captcha failure: {:#}", e);
            }
        }
        Ok(ContactOutcome::Invalid(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptchaConfig, ContactConfig};
    use crate::db::repositories::SqlxContactFormInfoRepository;
    use crate::test_support::{solve_captcha, Fixture, RecordingMailer};
    use chrono::Duration;

    fn service(fx: &Fixture, mailer: Arc<RecordingMailer>) -> ContactService {
        let captcha = Arc::new(
            CaptchaService::new(&CaptchaConfig {
                secret: Some("secret".to_string()),
                ttl_seconds: 600,
            })
            .unwrap(),
        );
        let guard = AbuseGuard::new(
            SqlxContactFormInfoRepository::boxed(fx.pool.clone()),
            mailer.clone(),
            &ContactConfig::default(),
        );
        ContactService::new(
            captcha,
            guard,
            mailer,
            vec![StaffContact {
                name: "Support".to_string(),
                email: "support@example.com".to_string(),
            }],
        )
    }

    fn form(svc: &ContactService, correct: bool) -> ContactForm {
        let challenge = svc.captcha().issue();
        let answer = solve_captcha(&challenge) + if correct { 0 } else { 1 };
        ContactForm {
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            phone: "555-0100".to_string(),
            message: "Do you buy collections?".to_string(),
            captcha_token: challenge.token,
            captcha: answer.to_string(),
        }
    }

    #[tokio::test]
    async fn test_valid_submission_is_mailed() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let svc = service(&fx, mailer.clone());

        let outcome = svc.submit(&coins, &form(&svc, true), "10.0.0.1", Utc::now()).await.unwrap();
        assert_eq!(outcome, ContactOutcome::Sent);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Contact Form From coins market");
        assert_eq!(
            sent[0].body,
            "Message from Ann (email ann@example.com, phone 555-0100).\nDo you buy collections?"
        );
        assert_eq!(sent[0].to, vec!["support@example.com".to_string(), coins.contact_email.clone()]);
        assert_eq!(sent[0].smtp_api_header().as_deref(), Some(r#"{"category": "Contact Form"}"#));
    }

    #[tokio::test]
    async fn test_mail_failure_still_counts_as_sent() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let svc = service(&fx, Arc::new(RecordingMailer::failing()));
        let outcome = svc.submit(&coins, &form(&svc, true), "10.0.0.1", Utc::now()).await.unwrap();
        assert_eq!(outcome, ContactOutcome::Sent);
    }

    #[tokio::test]
    async fn test_bad_captcha_goes_through_abuse_guard() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let svc = service(&fx, mailer.clone());
        let t0 = Utc::now();

        let bad = form(&svc, false);
        let outcome = svc.submit(&coins, &bad, "10.0.0.1", t0).await.unwrap();
        match outcome {
            ContactOutcome::Invalid(errors) => assert!(errors.has("captcha")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(mailer.sent().is_empty());

        svc.submit(&coins, &bad, "10.0.0.1", t0 + Duration::seconds(130)).await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Contact Form, bad captcha");
    }

    #[tokio::test]
    async fn test_other_errors_skip_abuse_guard() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let svc = service(&fx, mailer.clone());
        let t0 = Utc::now();

        for offset in [0, 500] {
            let mut missing_name = form(&svc, true);
            missing_name.name.clear();
            let outcome = svc
                .submit(&coins, &missing_name, "10.0.0.1", t0 + Duration::seconds(offset))
                .await
                .unwrap();
            assert!(matches!(outcome, ContactOutcome::Invalid(ref e) if e.has("name") && !e.has("captcha")));
        }
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_captcha_is_rejected() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let mailer = Arc::new(RecordingMailer::new());
        let svc = service(&fx, mailer.clone());
        let t0 = Utc::now();

        let solved = form(&svc, true);
        assert_eq!(svc.submit(&coins, &solved, "10.0.0.1", t0).await.unwrap(), ContactOutcome::Sent);
        for _ in 0..4 {
            let outcome = svc.submit(&coins, &solved, "10.0.0.1", t0).await.unwrap();
            assert!(matches!(outcome, ContactOutcome::Invalid(ref e) if e.has("captcha")));
        }
        // Only the first submission is delivered
        assert_eq!(mailer.sent().len(), 1);
    }
}
