//! Contact-us page

use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use tera::Context as TeraContext;

use crate::api::common::render;
use crate::api::middleware::{AppState, RequestContext, ViewError};
use crate::services::{ContactForm, ContactOutcome, FormErrors};

/// Render the form with a fresh captcha challenge
fn render_contact(
    state: &AppState,
    ctx: &RequestContext,
    form: ContactForm,
    errors: &FormErrors,
) -> Result<Html<String>, ViewError> {
    let challenge = state.contact.captcha().issue();
    let form = ContactForm {
        captcha_token: challenge.token.clone(),
        captcha: String::new(),
        ..form
    };

    let mut context = TeraContext::new();
    context.insert("form", &form);
    context.insert("errors", errors);
    context.insert("captcha", &challenge);
    render(state, ctx, "contact_us.html", &context)
}

/// GET /contact-us
pub async fn contact_us(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ViewError> {
    render_contact(&state, &ctx, ContactForm::default(), &FormErrors::new())
}

/// POST /contact-us
pub async fn submit_contact(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<ContactForm>,
) -> Result<Response, ViewError> {
    match state
        .contact
        .submit(&ctx.marketplace, &form, &ctx.remote_ip, Utc::now())
        .await?
    {
        ContactOutcome::Sent => Ok(Redirect::to("/").into_response()),
        ContactOutcome::Invalid(errors) => Ok(render_contact(&state, &ctx, form, &errors)?.into_response()),
    }
}
