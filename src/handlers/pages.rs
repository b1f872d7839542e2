//! Page shell served for every non-API path.
//!
//! Stands in for the dashboard's rendered pages. By the time a request gets
//! here the session gate has already let it through, so a protected path
//! always arrives with a [`Session`] in its extensions.

use axum::Extension;
use axum::extract::OriginalUri;
use axum::response::Html;

use crate::middleware::route_class::{LOGIN_PATH, REGISTER_PATH};
use crate::session::Session;

/// Render the page shell for the requested path.
pub async fn page_shell(
    OriginalUri(uri): OriginalUri,
    session: Option<Extension<Session>>,
) -> Html<String> {
    let path = uri.path();
    let greeting = match session.as_ref() {
        Some(Extension(session)) => {
            let who = session
                .claims
                .name
                .as_deref()
                .unwrap_or_else(|| session.user_id());
            format!("<p>Signed in as {}</p>", escape_html(who))
        }
        None => "<p>Not signed in</p>".to_string(),
    };

    let body = if path == LOGIN_PATH || path == REGISTER_PATH {
        format!(r#"<form method="post" action="{path}" data-form="{path}"></form>"#)
    } else {
        String::new()
    };

    Html(format!(
        "<!doctype html>\n<html><head><title>{title}</title></head>\
         <body><main data-path=\"{title}\">{greeting}{body}</main></body></html>",
        title = escape_html(path),
    ))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
