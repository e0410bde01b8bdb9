//! The registration page for creating a new user account.

use std::sync::{Arc, Mutex};

use axum::{
    Form,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error, PasswordHash, ValidatedPassword,
    endpoints,
    html::{
        BUTTON_PRIMARY_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, auth_card, base,
        loading_indicator, password_input,
    },
    internal_server_error::get_internal_server_error_redirect,
    user::create_user,
};

/// The minimum number of characters a username must have.
const USERNAME_MIN_LENGTH: usize = 4;

/// Which form fields had problems, and what the problems were.
#[derive(Default)]
struct RegistrationErrors<'a> {
    username: Option<&'a str>,
    password: Option<&'a str>,
    confirm_password: Option<&'a str>,
}

fn registration_form(username: &str, errors: RegistrationErrors) -> Markup {
    html! {
        form
            hx-post=(endpoints::USERS)
            hx-indicator="#indicator"
            hx-disabled-elt="#username, #password, #confirm_password, #submit-button"
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
                    minlength=(USERNAME_MIN_LENGTH)
                    value=(username);

                @if let Some(error_message) = errors.username
                {
                    p class="text-red-500 text-base" { (error_message) }
                }
            }

            (password_input("password", "Password", errors.password))
            (password_input("confirm_password", "Confirm Password", errors.confirm_password))

            button
                type="submit" id="submit-button" tabindex="0"
                class=(BUTTON_PRIMARY_STYLE)
            {
                (loading_indicator())
                "Create Account"
            }

            p class="text-sm font-light text-gray-500 dark:text-gray-400"
            {
                "Already have an account? "

                a
                    href=(endpoints::LOG_IN_VIEW) tabindex="0"
                    class="font-semibold leading-6 text-blue-600 hover:text-blue-500 dark:text-blue-500 dark:hover:text-blue-400"
                {
                  "Log in here"
                }
            }
        }
    }
}

/// Display the registration page.
pub async fn get_register_page() -> Response {
    let registration_form = registration_form("", RegistrationErrors::default());
    let content = auth_card("Create an account", &registration_form);
    base("Register", &content).into_response()
}

/// The state needed for creating a new user.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    /// The database connection for creating users.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The form data for a registration request.
#[derive(Serialize, Deserialize)]
pub struct RegisterForm {
    /// The name the new user will log in with.
    pub username: String,
    /// The new user's password.
    pub password: String,
    /// The password typed a second time.
    pub confirm_password: String,
}

/// Handler for registration requests via the POST method.
///
/// On success the client is redirected to the log-in page. On a validation
/// failure the form is returned with field-attributed error messages.
pub async fn register_user(
    State(state): State<RegistrationState>,
    Form(user_data): Form<RegisterForm>,
) -> Response {
    let username = user_data.username.trim();

    if username.len() < USERNAME_MIN_LENGTH {
        return registration_form(
            username,
            RegistrationErrors {
                username: Some("Username must be at least 4 characters."),
                ..Default::default()
            },
        )
        .into_response();
    }

    let validated_password = match ValidatedPassword::new(&user_data.password) {
        Ok(password) => password,
        Err(error) => {
            return registration_form(
                username,
                RegistrationErrors {
                    password: Some(&error.to_string()),
                    ..Default::default()
                },
            )
            .into_response();
        }
    };

    if user_data.password != user_data.confirm_password {
        return registration_form(
            username,
            RegistrationErrors {
                confirm_password: Some("Passwords do not match."),
                ..Default::default()
            },
        )
        .into_response();
    }

    let password_hash = match PasswordHash::new(validated_password, PasswordHash::DEFAULT_COST) {
        Ok(hash) => hash,
        Err(error) => {
            tracing::error!("an error occurred while hashing a password: {error}");

            return get_internal_server_error_redirect();
        }
    };

    let result = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        create_user(username, password_hash, &connection)
    };

    match result {
        Ok(_) => (
            StatusCode::SEE_OTHER,
            HxRedirect(endpoints::LOG_IN_VIEW.to_owned()),
        )
            .into_response(),
        Err(Error::UsernameTaken) => registration_form(
            username,
            RegistrationErrors {
                username: Some("This username is already taken."),
                ..Default::default()
            },
        )
        .into_response(),
        Err(error) => {
            tracing::error!("An unhandled error occurred while inserting a new user: {error}");

            get_internal_server_error_redirect()
        }
    }
}
