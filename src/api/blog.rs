//! Marketplace blog

use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
    Form,
};
use chrono::Utc;
use tera::Context as TeraContext;

use crate::api::common::{render, PageQuery};
use crate::api::middleware::{AppState, RequestContext, ViewError};
use crate::services::{parse_page_param, CommentOutcome, PostCommentForm};

/// GET /blog
pub async fn blog(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ViewError> {
    let index = state
        .blog
        .index(&ctx.marketplace, parse_page_param(query.page.as_deref()))
        .await?;

    let mut context = TeraContext::new();
    context.insert("posts", &index.posts);
    context.insert("paged", &index.posts.paged);
    context.insert("latest_posts", &index.latest_posts);
    context.insert("latest_comments", &index.latest_comments);
    context.insert("picks", &index.picks);
    context.insert("archive", &index.archive);
    context.insert("form", &PostCommentForm::default());
    render(&state, &ctx, "blog.html", &context)
}

/// POST /blog/comment - Add a reader comment (login required)
///
/// Always returns to the blog; a comment that fails validation is dropped.
pub async fn add_post_comment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<PostCommentForm>,
) -> Result<Redirect, ViewError> {
    let user = ctx
        .user
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("comment posted without a signed-in user"))?;

    if let CommentOutcome::Saved(id) = state.blog.add_comment(&ctx.marketplace, user, &form, Utc::now()).await? {
        tracing::info!(marketplace = %ctx.marketplace.slug, comment = id, "Blog comment added");
    }
    Ok(Redirect::to("/blog"))
}

/// GET /blog/{post_slug}
pub async fn view_post(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(post_slug): Path<String>,
) -> Result<Html<String>, ViewError> {
    let view = state
        .blog
        .post(&ctx.marketplace, &post_slug)
        .await?
        .ok_or(ViewError::Forbidden)?;

    let mut context = TeraContext::new();
    context.insert("post", &view.post);
    context.insert("comments", &view.comments);
    context.insert(
        "form",
        &PostCommentForm {
            post: view.post.id.to_string(),
            comment: String::new(),
        },
    );
    render(&state, &ctx, "post.html", &context)
}
