//! Newsletter signup

use super::forms::{FormErrors, NewsletterForm};
use crate::db::repositories::MailingListRepository;
use crate::models::{MailingListMember, Marketplace};
use anyhow::Result;
use std::sync::Arc;

pub const SIGNUP_SUCCESS_MESSAGE: &str = "Email successfully registered.";
const ALREADY_REGISTERED: &str = "This email is already registered.";

pub struct NewsletterService {
    members: Arc<dyn MailingListRepository>,
}

impl NewsletterService {
    pub fn new(members: Arc<dyn MailingListRepository>) -> Self {
        Self { members }
    }

    /// Register the submitted address with the marketplace.
    ///
    /// Validation problems, including an address that is already on the
    /// list, come back as form errors and nothing is stored.
    pub async fn subscribe(
        &self,
        marketplace: &Marketplace,
        form: &NewsletterForm,
    ) -> Result<Result<MailingListMember, FormErrors>> {
        let mut errors = form.validate();
        if !errors.is_empty() {
            return Ok(Err(errors));
        }

        let email = form.email.trim();
        if self.members.exists(marketplace.id, email).await? {
            errors.add("email", ALREADY_REGISTERED);
            return Ok(Err(errors));
        }

        let member = self.members.create(marketplace.id, email).await?;
        tracing::info!(marketplace = %marketplace.slug, "Newsletter signup");
        Ok(Ok(member))
    }
}
