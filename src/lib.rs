//! Spendbook is a web app for keeping track of personal expenses.
//!
//! This library provides a REST API that directly serves HTML pages.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use tokio::signal;

mod alert;
mod app_state;
mod auth;
mod budget;
mod dashboard;
mod db;
mod endpoints;
mod expense;
mod expense_form;
mod expenses_page;
mod html;
mod import;
mod internal_server_error;
mod log_in;
mod log_out;
mod logging;
mod money;
mod navigation;
mod not_found;
mod pagination;
mod password;
mod register_user;
mod routing;
#[cfg(test)]
mod test_utils;
mod timezone;
mod user;

pub use app_state::AppState;
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use pagination::PaginationConfig;
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use user::{User, UserID, get_user_by_id};

use crate::{
    alert::Alert, expense::ValidationError, internal_server_error::InternalServerError,
    not_found::get_404_not_found_response,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user provided an incorrect username or password.
    #[error("incorrect username or password")]
    InvalidCredentials,

    /// Either the user ID or expiry cookie is missing from the cookie jar in
    /// the request.
    #[error("no auth cookies in the cookie jar")]
    CookieMissing,

    /// The user provided a password that does not meet the password policy.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// The username chosen during registration already belongs to another user.
    #[error("the username is already taken")]
    UsernameTaken,

    /// A candidate expense failed one of the domain validation rules.
    ///
    /// These errors are user-correctable and field-attributed. Inside the CSV
    /// import they are swallowed per row; in the create and edit forms they
    /// are rendered back to the user.
    #[error("{0}")]
    InvalidExpense(#[from] ValidationError),

    /// The file upload failed before any content could be read.
    #[error("the file upload failed before any content could be read")]
    UploadFailed,

    /// The uploaded file is not a CSV file.
    #[error("the uploaded file is not a CSV")]
    NotCsv,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The requested resource belongs to another user.
    #[error("the requested resource belongs to another user")]
    Forbidden,

    /// Tried to update an expense that does not exist.
    #[error("tried to update an expense that is not in the database")]
    UpdateMissingExpense,

    /// Tried to delete an expense that does not exist.
    #[error("tried to delete an expense that is not in the database")]
    DeleteMissingExpense,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.username") =>
            {
                Error::UsernameTaken
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => get_404_not_found_response(),
            Error::Forbidden => StatusCode::FORBIDDEN.into_response(),
            Error::InvalidTimezoneError(timezone) => InternalServerError {
                description: "Invalid Timezone Settings",
                fix: &format!(
                    "Could not get local timezone \"{timezone}\". Check your server settings and \
                    ensure the timezone has been set to a valid, canonical timezone string"
                ),
            }
            .into_response(),
            Error::DatabaseLockError => InternalServerError::default().into_response(),
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                InternalServerError::default().into_response()
            }
        }
    }
}

impl Error {
    fn into_alert_response(self) -> Response {
        match self {
            Error::InvalidExpense(reason) => (
                StatusCode::BAD_REQUEST,
                Alert::Error {
                    message: "Invalid expense".to_owned(),
                    details: reason.to_string(),
                }
                .into_html(),
            )
                .into_response(),
            Error::UploadFailed => (
                StatusCode::BAD_REQUEST,
                Alert::ErrorSimple {
                    message: "The file upload failed, please try again.".to_owned(),
                }
                .into_html(),
            )
                .into_response(),
            Error::NotCsv => (
                StatusCode::BAD_REQUEST,
                Alert::ErrorSimple {
                    message: "File type must be CSV.".to_owned(),
                }
                .into_html(),
            )
                .into_response(),
            Error::UpdateMissingExpense => (
                StatusCode::NOT_FOUND,
                Alert::Error {
                    message: "Could not update expense".to_owned(),
                    details: "The expense could not be found.".to_owned(),
                }
                .into_html(),
            )
                .into_response(),
            Error::DeleteMissingExpense => (
                StatusCode::NOT_FOUND,
                Alert::Error {
                    message: "Could not delete expense".to_owned(),
                    details: "The expense could not be found. \
                    Try refreshing the page to see if the expense has already been deleted."
                        .to_owned(),
                }
                .into_html(),
            )
                .into_response(),
            Error::Forbidden => (
                StatusCode::FORBIDDEN,
                Alert::ErrorSimple {
                    message: "This expense belongs to another user.".to_owned(),
                }
                .into_html(),
            )
                .into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Alert::Error {
                    message: "Something went wrong".to_owned(),
                    details: "An unexpected error occurred, check the server logs for more details."
                        .to_owned(),
                }
                .into_html(),
            )
                .into_response(),
        }
    }
}
