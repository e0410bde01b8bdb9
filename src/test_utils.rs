//! Helpers shared between the HTTP handler tests.

use axum::{
    body::Body,
    http::{Response, header::CONTENT_TYPE},
};
use scraper::Html;

/// Read `response`'s body and parse it as a full HTML document.
pub async fn parse_html_document(response: Response<Body>) -> Html {
    Html::parse_document(&response_text(response).await)
}

/// Read `response`'s body and parse it as an HTML fragment.
pub async fn parse_html_fragment(response: Response<Body>) -> Html {
    Html::parse_fragment(&response_text(response).await)
}

async fn response_text(response: Response<Body>) -> String {
    let body = response.into_body();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    String::from_utf8_lossy(&body).to_string()
}

/// Assert that `html` parsed without errors.
#[track_caller]
pub fn assert_valid_html(html: &Html) {
    assert!(
        html.errors.is_empty(),
        "Got HTML parsing errors: {:?}",
        html.errors
    );
}

/// Assert that `response` has the content type `content_type`.
#[track_caller]
pub fn assert_content_type(response: &Response<Body>, content_type: &str) {
    let got = response
        .headers()
        .get(CONTENT_TYPE)
        .expect("Content-Type header missing")
        .to_str()
        .unwrap()
        .to_owned();

    assert_eq!(
        got, content_type,
        "want content type {content_type}, got {got}"
    );
}

/// Assert that `html` contains an alert fragment with the headline
/// `expected_message`.
#[track_caller]
pub fn assert_alert_message(html: &Html, expected_message: &str) {
    let alert_container = html
        .select(&scraper::Selector::parse("#alert-container").unwrap())
        .next()
        .expect("No alert container found");

    let message_p = alert_container
        .select(&scraper::Selector::parse("p.text-sm.font-medium").unwrap())
        .next()
        .expect("No alert message found");

    let message = message_p.text().collect::<String>();
    assert_eq!(message.trim(), expected_message);
}
