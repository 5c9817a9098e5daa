//! Uncacheable redirects with an HTML fallback.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};

/// Request header that forces the HTML redirect page.
pub const FORCE_HTML_REDIRECT: &str = "x-force-html-redirect";

const NO_CACHE: [(header::HeaderName, &str); 3] = [
    (
        header::CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, max-age=0",
    ),
    (header::PRAGMA, "no-cache"),
    (header::EXPIRES, "0"),
];

/// Redirect to `url` with 303 See Other.
///
/// The HTML page (meta refresh, script and link) is sent instead when
/// `force_html` is set or `url` cannot be carried in a `Location` header.
/// An empty `url` yields 400. Every response carries no-cache headers.
pub fn redirect(url: &str, force_html: bool) -> Response {
    let mut response = if url.is_empty() {
        (StatusCode::BAD_REQUEST, "Empty URL provided for redirect").into_response()
    } else {
        match HeaderValue::from_str(url) {
            Ok(location) if !force_html => {
                tracing::debug!(url, "Redirecting");
                (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response()
            }
            _ => {
                tracing::debug!(url, "Sending HTML redirect");
                Html(html_page(url)).into_response()
            }
        }
    };

    let headers = response.headers_mut();
    for (name, value) in NO_CACHE {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// [`redirect`], forcing HTML when the request sent `X-Force-HTML-Redirect: true`.
pub fn redirect_for(request_headers: &HeaderMap, url: &str) -> Response {
    let force_html = request_headers
        .get(FORCE_HTML_REDIRECT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    redirect(url, force_html)
}

fn html_page(url: &str) -> String {
    let url = html_escape(url);
    format!(
        "<html><head><meta http-equiv=\"refresh\" content=\"0;url={url}\">\
         <script type=\"text/javascript\">window.location.href = \"{url}\";</script>\
         </head><body><p>If you are not redirected automatically, please \
         <a href=\"{url}\">click here</a>.</p></body></html>"
    )
}

fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            '\0' => escaped.push('\u{FFFD}'),
            c => escaped.push(c),
        }
    }
    escaped
}
