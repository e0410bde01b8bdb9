/*! Cookie auth: setting and validating the auth cookies, and the middleware
that protects routes behind a log-in. */

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    PrivateCookieJar,
    cookie::{Cookie, Key, SameSite},
};
use axum_htmx::HxRedirect;
use time::{
    Duration, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description,
};

use crate::{AppState, Error, endpoints, user::UserID};

pub(crate) const COOKIE_USER_ID: &str = "user_id";
pub(crate) const COOKIE_EXPIRY: &str = "expiry";

/// The default duration for which auth cookies are valid.
pub(crate) const DEFAULT_COOKIE_DURATION: Duration = Duration::minutes(30);

/// Date time format for the expiry cookie, e.g. "2021-01-01 00:00:00.000000 +00:00:00".
const DATE_TIME_FORMAT: &[BorrowedFormatItem] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond] [offset_hour \
         sign:mandatory]:[offset_minute]:[offset_second]"
);

/// Add the auth cookies to the cookie jar, indicating that a user is logged in
/// and authenticated.
///
/// Sets the expiry of the cookies to `duration` from the current time.
///
/// Returns the cookie jar with the cookies added.
///
/// # Errors
///
/// Returns a [time::error::Format] if the expiry time cannot be formatted.
pub(crate) fn set_auth_cookie(
    jar: PrivateCookieJar,
    user_id: UserID,
    duration: Duration,
) -> Result<PrivateCookieJar, time::error::Format> {
    let expiry = OffsetDateTime::now_utc() + duration;
    // Use format instead of to_string to avoid errors at midnight when the hour is printed as
    // a single digit when DATE_TIME_FORMAT expects two digits.
    let expiry_string = expiry.format(DATE_TIME_FORMAT)?;

    Ok(jar
        .add(
            Cookie::build((COOKIE_USER_ID, user_id.as_i64().to_string()))
                .expires(expiry)
                .http_only(true)
                .same_site(SameSite::Strict)
                .secure(true),
        )
        .add(
            Cookie::build((COOKIE_EXPIRY, expiry_string))
                .expires(expiry)
                .http_only(true)
                .same_site(SameSite::Strict)
                .secure(true),
        ))
}

/// Set the auth cookies to an invalid value and set their max age to zero,
/// which should delete the cookies on the client side.
pub(crate) fn invalidate_auth_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.add(
        Cookie::build((COOKIE_USER_ID, "deleted"))
            .expires(OffsetDateTime::UNIX_EPOCH)
            .max_age(Duration::ZERO)
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(true),
    )
    .add(
        Cookie::build((COOKIE_EXPIRY, "deleted"))
            .expires(OffsetDateTime::UNIX_EPOCH)
            .max_age(Duration::ZERO)
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(true),
    )
}

/// Get the ID of the logged in user from the auth cookies.
///
/// # Errors
///
/// Returns an:
/// - [Error::CookieMissing] if either auth cookie is not in the jar,
/// - [Error::InvalidCredentials] if the cookies cannot be parsed or the
///   expiry has passed.
pub(crate) fn get_user_id_from_auth_cookie(jar: &PrivateCookieJar) -> Result<UserID, Error> {
    let user_id_cookie = jar.get(COOKIE_USER_ID).ok_or(Error::CookieMissing)?;
    let expiry_cookie = jar.get(COOKIE_EXPIRY).ok_or(Error::CookieMissing)?;

    let expiry = OffsetDateTime::parse(expiry_cookie.value_trimmed(), DATE_TIME_FORMAT)
        .map_err(|_| Error::InvalidCredentials)?;

    if expiry < OffsetDateTime::now_utc() {
        return Err(Error::InvalidCredentials);
    }

    user_id_cookie
        .value_trimmed()
        .parse()
        .map(UserID::new)
        .map_err(|_| Error::InvalidCredentials)
}

/// The state needed for the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AuthState> for Key {
    fn from_ref(state: &AuthState) -> Self {
        state.cookie_key.clone()
    }
}

#[inline]
async fn auth_guard_internal(
    state: AuthState,
    request: Request,
    next: Next,
    get_redirect: impl Fn() -> Response,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let jar = match PrivateCookieJar::from_request_parts(&mut parts, &state).await {
        Ok(jar) => jar,
        Err(err) => {
            tracing::error!("Error getting cookie jar: {err:?}. Redirecting to log in page.");
            return get_redirect();
        }
    };

    let user_id = match get_user_id_from_auth_cookie(&jar) {
        Ok(user_id) => user_id,
        Err(_) => return get_redirect(),
    };

    parts.extensions.insert(user_id);
    let request = Request::from_parts(parts, body);
    let response = next.run(request).await;

    // Sliding expiry: the cookies are refreshed on every authenticated request.
    let (mut parts, body) = response.into_parts();
    match set_auth_cookie(jar, user_id, state.cookie_duration) {
        Ok(updated_jar) => {
            for (key, value) in updated_jar.into_response().headers().iter() {
                if key != SET_COOKIE {
                    continue;
                }

                parts.headers.append(key, value.to_owned());
            }
        }
        Err(error) => {
            tracing::error!("Error refreshing auth cookie expiry: {error}");
        }
    }

    Response::from_parts(parts, body)
}

/// Middleware function that checks for a valid authorization cookie.
/// The user ID is placed into the request and then the request executed normally if the cookie is
/// valid, otherwise a redirect to the log-in page is returned.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(user_id): Extension<UserID>` to receive the user ID.
///
/// **Note**: The app state must contain an `axum_extra::extract::cookie::Key` for decrypting and
/// verifying the cookie contents.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    auth_guard_internal(state, request, next, || {
        Redirect::to(endpoints::LOG_IN_VIEW).into_response()
    })
    .await
}

/// Middleware function that checks for a valid authorization cookie.
/// The user ID is placed into the request and then the request executed normally if the cookie is
/// valid, otherwise a HTMX redirect to the log-in page is returned.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(user_id): Extension<UserID>` to receive the user ID.
pub async fn auth_guard_hx(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    auth_guard_internal(state, request, next, || {
        (
            HxRedirect(endpoints::LOG_IN_VIEW.to_owned()),
            StatusCode::OK,
        )
            .into_response()
    })
    .await
}

#[cfg(test)]
mod cookie_tests {
    use axum_extra::extract::{PrivateCookieJar, cookie::Key};
    use sha2::{Digest, Sha512};
    use time::Duration;

    use crate::{Error, user::UserID};

    use super::{
        DEFAULT_COOKIE_DURATION, get_user_id_from_auth_cookie, invalidate_auth_cookie,
        set_auth_cookie,
    };

    fn get_jar() -> PrivateCookieJar {
        let key = Key::from(&Sha512::digest("42"));
        PrivateCookieJar::new(key)
    }

    #[test]
    fn set_then_get_round_trips_user_id() {
        let jar = set_auth_cookie(get_jar(), UserID::new(123), DEFAULT_COOKIE_DURATION).unwrap();

        let user_id = get_user_id_from_auth_cookie(&jar).unwrap();

        assert_eq!(user_id, UserID::new(123));
    }

    #[test]
    fn get_fails_with_empty_jar() {
        assert_eq!(
            get_user_id_from_auth_cookie(&get_jar()),
            Err(Error::CookieMissing)
        );
    }

    #[test]
    fn get_fails_after_expiry() {
        let jar = set_auth_cookie(get_jar(), UserID::new(123), Duration::seconds(-10)).unwrap();

        assert_eq!(
            get_user_id_from_auth_cookie(&jar),
            Err(Error::InvalidCredentials)
        );
    }

    #[test]
    fn get_fails_after_invalidation() {
        let jar = set_auth_cookie(get_jar(), UserID::new(123), DEFAULT_COOKIE_DURATION).unwrap();
        let jar = invalidate_auth_cookie(jar);

        assert!(get_user_id_from_auth_cookie(&jar).is_err());
    }
}

#[cfg(test)]
mod auth_guard_tests {
    use axum::{
        Extension, Router,
        extract::State,
        middleware,
        response::Html,
        routing::{get, post},
    };
    use axum_extra::extract::{PrivateCookieJar, cookie::Key};
    use axum_test::TestServer;
    use sha2::{Digest, Sha512};
    use time::Duration;

    use crate::{endpoints, user::UserID};

    use super::{AuthState, DEFAULT_COOKIE_DURATION, auth_guard, auth_guard_hx, set_auth_cookie};

    async fn test_handler(Extension(user_id): Extension<UserID>) -> Html<String> {
        Html(format!("<h1>Hello, user {user_id}!</h1>"))
    }

    async fn stub_log_in_route(
        State(state): State<AuthState>,
        jar: PrivateCookieJar,
    ) -> PrivateCookieJar {
        set_auth_cookie(jar, UserID::new(1), state.cookie_duration).unwrap()
    }

    const TEST_LOG_IN_ROUTE: &str = "/log_in_stub";
    const TEST_PROTECTED_ROUTE: &str = "/protected";

    fn get_test_state(cookie_duration: Duration) -> AuthState {
        let hash = Sha512::digest("nafstenoas");

        AuthState {
            cookie_key: Key::from(&hash),
            cookie_duration,
        }
    }

    fn get_test_server(cookie_duration: Duration) -> TestServer {
        let state = get_test_state(cookie_duration);

        let app = Router::new()
            .route(TEST_PROTECTED_ROUTE, get(test_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard))
            .route(TEST_LOG_IN_ROUTE, post(stub_log_in_route))
            .with_state(state);

        TestServer::new(app).expect("Could not create test server.")
    }

    fn get_test_server_hx(cookie_duration: Duration) -> TestServer {
        let state = get_test_state(cookie_duration);

        let app = Router::new()
            .route(TEST_PROTECTED_ROUTE, get(test_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard_hx))
            .route(TEST_LOG_IN_ROUTE, post(stub_log_in_route))
            .with_state(state);

        TestServer::new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn get_protected_route_with_valid_cookie() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);
        let response = server.post(TEST_LOG_IN_ROUTE).await;

        response.assert_status_ok();
        let jar = response.cookies();

        server
            .get(TEST_PROTECTED_ROUTE)
            .add_cookies(jar)
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn get_protected_route_with_no_auth_cookie_redirects_to_log_in() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);

        let response = server.get(TEST_PROTECTED_ROUTE).await;

        response.assert_status_see_other();
        assert_eq!(response.header("location"), endpoints::LOG_IN_VIEW);
    }

    #[tokio::test]
    async fn get_protected_route_with_expired_cookie_redirects_to_log_in() {
        let server = get_test_server(Duration::seconds(-10));
        let response = server.post(TEST_LOG_IN_ROUTE).await;

        response.assert_status_ok();
        let jar = response.cookies();

        let response = server.get(TEST_PROTECTED_ROUTE).add_cookies(jar).await;

        response.assert_status_see_other();
        assert_eq!(response.header("location"), endpoints::LOG_IN_VIEW);
    }

    #[tokio::test]
    async fn hx_guard_redirects_with_hx_redirect_header() {
        let server = get_test_server_hx(DEFAULT_COOKIE_DURATION);

        let response = server.get(TEST_PROTECTED_ROUTE).await;

        response.assert_status_ok();
        assert_eq!(response.header("hx-redirect"), endpoints::LOG_IN_VIEW);
    }

    #[tokio::test]
    async fn auth_guard_refreshes_auth_cookies() {
        let server = get_test_server(DEFAULT_COOKIE_DURATION);
        let response = server.post(TEST_LOG_IN_ROUTE).await;

        response.assert_status_ok();
        let jar = response.cookies();

        let response = server.get(TEST_PROTECTED_ROUTE).add_cookies(jar).await;
        let jar = response.cookies();

        assert!(
            jar.get(super::COOKIE_USER_ID).is_some(),
            "expected user ID cookie to be refreshed by the auth guard"
        );
        assert!(
            jar.get(super::COOKIE_EXPIRY).is_some(),
            "expected expiry cookie to be refreshed by the auth guard"
        );
    }
}
