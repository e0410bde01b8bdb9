//! This file defines the routes for displaying the log-in page and handling log-in requests.
//! The auth module handles the lower level cookie auth logic.

use std::sync::{Arc, Mutex};

use axum::{
    Form,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::set_auth_cookie,
    endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, auth_card, base,
        loading_indicator, password_input,
    },
    internal_server_error::get_internal_server_error_redirect,
    user::get_user_by_username,
};

/// The error message shown when the username or password is wrong.
pub const INVALID_CREDENTIALS_ERROR_MSG: &str = "Incorrect username or password.";

fn log_in_form(username: &str, error_message: Option<&str>) -> Markup {
    html! {
        form
            hx-post=(endpoints::LOG_IN_API)
            hx-indicator="#indicator"
            hx-disabled-elt="#username, #password, #submit-button"
            class="space-y-4 md:space-y-6"
        {
            div
            {
                label
                    for="username"
                    class=(FORM_LABEL_STYLE)
                {
                    "Username"
                }

                input
                    type="text"
                    name="username"
                    id="username"
                    class=(FORM_TEXT_INPUT_STYLE)
                    required
                    autofocus
                    value=(username);
            }

            (password_input("password", "Password", None))

            @if let Some(error_message) = error_message
            {
                p class="text-red-500 text-base" { (error_message) }
            }

            button
                type="submit" id="submit-button" tabindex="0"
                class=(BUTTON_PRIMARY_STYLE)
            {
                (loading_indicator())
                "Log in"
            }

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Don't have an account? "

                a
                    href=(endpoints::REGISTER_VIEW) tabindex="0"
                    class="font-semibold leading-6 text-blue-600 hover:text-blue-500 dark:text-blue-500 dark:hover:text-blue-400"
                {
                  "Register here"
                }
            }
        }
    }
}

/// Display the log-in page.
pub async fn get_log_in_page() -> Response {
    let log_in_form = log_in_form("", None);
    let content = auth_card("Log in to your account", &log_in_form);
    base("Log In", &content).into_response()
}

/// The state needed to perform a log-in.
#[derive(Debug, Clone)]
pub struct LogInState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,
    /// The database connection for looking up users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LogInState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<LogInState> for Key {
    fn from_ref(state: &LogInState) -> Self {
        state.cookie_key.clone()
    }
}

/// The form data for a log-in request.
#[derive(Serialize, Deserialize)]
pub struct LogInForm {
    /// The name the user registered with.
    pub username: String,
    /// The user's password.
    pub password: String,
}

/// Handler for log-in requests via the POST method.
///
/// On a successful log-in request, the auth cookies are set and the client is
/// redirected to the dashboard page. Otherwise, the form is returned with an
/// error message explaining the problem. An unknown username and a wrong
/// password produce the same message.
pub async fn post_log_in(
    State(state): State<LogInState>,
    jar: PrivateCookieJar,
    Form(data): Form<LogInForm>,
) -> Response {
    let username = data.username.trim();

    let user = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        get_user_by_username(username, &connection)
    };

    let user = match user {
        Ok(user) => user,
        Err(Error::NotFound) => {
            return log_in_form(username, Some(INVALID_CREDENTIALS_ERROR_MSG)).into_response();
        }
        Err(error) => {
            tracing::error!("An unhandled error occurred while fetching a user: {error}");
            return get_internal_server_error_redirect();
        }
    };

    match user.password_hash.verify(&data.password) {
        Ok(true) => {}
        Ok(false) => {
            return log_in_form(username, Some(INVALID_CREDENTIALS_ERROR_MSG)).into_response();
        }
        Err(error) => {
            tracing::error!("An error occurred while verifying a password: {error}");
            return get_internal_server_error_redirect();
        }
    }

    match set_auth_cookie(jar, user.id, state.cookie_duration) {
        Ok(jar) => (
            StatusCode::SEE_OTHER,
            HxRedirect(endpoints::DASHBOARD_VIEW.to_owned()),
            jar,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("An error occurred while setting the auth cookie: {error}");
            get_internal_server_error_redirect()
        }
    }
}
