//! Defines the template and route handler for the 404 not found page.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::html::error_view;

/// Route handler for unmatched paths.
pub async fn get_404_not_found() -> Response {
    get_404_not_found_response()
}

/// Get a response containing the 404 not found page.
pub fn get_404_not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        error_view(
            "Page Not Found",
            "404",
            "Sorry, this page does not exist.",
            "Check the address for typos or head back to the dashboard.",
        ),
    )
        .into_response()
}
