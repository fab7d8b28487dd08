//! Submitted forms and their validation
//!
//! Field errors are collected per field so templates can show them next to
//! the input; a form with no errors is valid.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern")
});

pub const NAME_MAX_LEN: usize = 100;
pub const PHONE_MAX_LEN: usize = 30;
pub const COMMENT_MAX_LEN: usize = 2000;

const REQUIRED: &str = "This field is required.";
const INVALID_EMAIL: &str = "Enter a valid email address.";

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Field name to error messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn require<'a>(errors: &mut FormErrors, field: &str, value: &'a str) -> Option<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, REQUIRED);
        None
    } else {
        Some(trimmed)
    }
}

fn max_len(errors: &mut FormErrors, field: &str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters (it has {}).", max, len),
        );
    }
}

/// Newsletter signup on the home page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterForm {
    #[serde(default)]
    pub email: String,
}

impl NewsletterForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        if let Some(email) = require(&mut errors, "email", &self.email) {
            if !is_valid_email(email) {
                errors.add("email", INVALID_EMAIL);
            }
        }
        errors
    }
}

/// Contact-us form; the captcha fields hold the signed token and the answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub captcha_token: String,
    #[serde(default)]
    pub captcha: String,
}

impl ContactForm {
    /// Validate every field; `captcha_ok` is the outcome of the challenge check
    pub fn validate(&self, captcha_ok: bool) -> FormErrors {
        let mut errors = FormErrors::new();

        if let Some(name) = require(&mut errors, "name", &self.name) {
            max_len(&mut errors, "name", name, NAME_MAX_LEN);
        }
        if let Some(email) = require(&mut errors, "email", &self.email) {
            if !is_valid_email(email) {
                errors.add("email", INVALID_EMAIL);
            }
        }
        max_len(&mut errors, "phone", self.phone.trim(), PHONE_MAX_LEN);
        require(&mut errors, "message", &self.message);
        if require(&mut errors, "captcha", &self.captcha).is_some() && !captcha_ok {
            errors.add("captcha", "Invalid CAPTCHA");
        }

        errors
    }
}

/// Blog comment; `post` is the id of the commented post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCommentForm {
    #[serde(default)]
    pub post: String,
    #[serde(default)]
    pub comment: String,
}

impl PostCommentForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        if let Some(comment) = require(&mut errors, "comment", &self.comment) {
            max_len(&mut errors, "comment", comment, COMMENT_MAX_LEN);
        }
        errors
    }
}
