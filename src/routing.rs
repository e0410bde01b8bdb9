//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;

use crate::{
    AppState,
    auth::{auth_guard, auth_guard_hx},
    dashboard::get_dashboard_page,
    endpoints,
    expense_form::{
        create_expense_endpoint, delete_expense_endpoint, get_edit_expense_page,
        get_expense_endpoint, get_new_expense_page, update_expense_endpoint,
    },
    expenses_page::get_expenses_page,
    import::{get_import_page, import_expenses},
    internal_server_error::get_internal_server_error_page,
    log_in::{get_log_in_page, post_log_in},
    log_out::get_log_out,
    not_found::get_404_not_found,
    register_user::{get_register_page, register_user},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::LOG_IN_VIEW, get(get_log_in_page))
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out))
        .route(endpoints::REGISTER_VIEW, get(get_register_page))
        .route(endpoints::USERS, post(register_user))
        .route(
            endpoints::INTERNAL_ERROR_VIEW,
            get(get_internal_server_error_page),
        );

    let protected_routes = Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::DASHBOARD_VIEW, get(get_dashboard_page))
        .route(endpoints::EXPENSES_VIEW, get(get_expenses_page))
        .route(endpoints::NEW_EXPENSE_VIEW, get(get_new_expense_page))
        .route(endpoints::EDIT_EXPENSE_VIEW, get(get_edit_expense_page))
        .route(endpoints::IMPORT_VIEW, get(get_import_page))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    // These POST/PUT/DELETE routes need to use the HX-Redirect header for auth
    // redirects to work properly for HTMX requests.
    let protected_routes = protected_routes.merge(
        Router::new()
            .route(endpoints::EXPENSES_API, post(create_expense_endpoint))
            .route(endpoints::EXPENSE, get(get_expense_endpoint))
            .route(endpoints::EXPENSE, put(update_expense_endpoint))
            .route(endpoints::EXPENSE, delete(delete_expense_endpoint))
            .route(endpoints::IMPORT, post(import_expenses))
            .layer(middleware::from_fn_with_state(state.clone(), auth_guard_hx)),
    );

    protected_routes
        .merge(unprotected_routes)
        .nest_service(endpoints::STATIC, ServeDir::new("static/"))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The root path '/' redirects to the dashboard page.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD_VIEW)
}

#[cfg(test)]
mod routing_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use axum_test::TestServer;
    use rusqlite::Connection;

    use crate::{AppState, endpoints, pagination::PaginationConfig, routing::get_index_page};

    use super::build_router;

    #[tokio::test]
    async fn root_redirects_to_dashboard() {
        let response = get_index_page().await.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers().get("location").unwrap();
        assert_eq!(location, endpoints::DASHBOARD_VIEW);
    }

    fn get_test_server() -> TestServer {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        let state = AppState::new(connection, "42", "Etc/UTC", PaginationConfig::default())
            .expect("Could not create app state");

        TestServer::new(build_router(state)).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn protected_page_redirects_anonymous_user_to_log_in() {
        let server = get_test_server();

        let response = server.get(endpoints::DASHBOARD_VIEW).await;

        response.assert_status_see_other();
        assert_eq!(response.header("location"), endpoints::LOG_IN_VIEW);
    }

    #[tokio::test]
    async fn log_in_page_is_reachable_without_auth() {
        let server = get_test_server();

        server.get(endpoints::LOG_IN_VIEW).await.assert_status_ok();
    }

    #[tokio::test]
    async fn unknown_route_renders_not_found_page() {
        let server = get_test_server();

        let response = server.get("/no/such/page").await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn registered_user_can_log_in_and_view_dashboard() {
        let server = get_test_server();

        server
            .post(endpoints::USERS)
            .form(&crate::register_user::RegisterForm {
                username: "alice".to_string(),
                password: "averystrongpassword1".to_string(),
                confirm_password: "averystrongpassword1".to_string(),
            })
            .await
            .assert_status_see_other();

        let response = server
            .post(endpoints::LOG_IN_API)
            .form(&crate::log_in::LogInForm {
                username: "alice".to_string(),
                password: "averystrongpassword1".to_string(),
            })
            .await;

        response.assert_status_see_other();
        let jar = response.cookies();

        server
            .get(endpoints::DASHBOARD_VIEW)
            .add_cookies(jar)
            .await
            .assert_status_ok();
    }
}
