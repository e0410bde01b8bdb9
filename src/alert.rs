//! Alert fragments for displaying success and error messages to users.
//!
//! Alerts are rendered as out-of-band swaps into the `#alert-container`
//! element in the page skeleton, so any HTMX response can surface a message
//! regardless of its main swap target.

use axum::response::{IntoResponse, Response};
use maud::{Markup, html};

/// A message to surface to the user in the alert container.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// The operation succeeded.
    Success {
        /// The headline message.
        message: String,
        /// Supporting detail shown below the message.
        details: String,
    },
    /// The operation failed.
    Error {
        /// The headline message.
        message: String,
        /// Supporting detail shown below the message.
        details: String,
    },
    /// The operation failed and there is nothing more to say about it.
    ErrorSimple {
        /// The headline message.
        message: String,
    },
}

impl Alert {
    /// Render the alert as an out-of-band fragment targeting `#alert-container`.
    pub fn into_html(self) -> Markup {
        let (container_style, message, details) = match self {
            Alert::Success { message, details } => (
                "p-4 rounded border border-green-300 bg-green-50 text-green-800 \
                dark:border-green-800 dark:bg-gray-800 dark:text-green-400",
                message,
                details,
            ),
            Alert::Error { message, details } => (
                "p-4 rounded border border-red-300 bg-red-50 text-red-800 \
                dark:border-red-800 dark:bg-gray-800 dark:text-red-400",
                message,
                details,
            ),
            Alert::ErrorSimple { message } => (
                "p-4 rounded border border-red-300 bg-red-50 text-red-800 \
                dark:border-red-800 dark:bg-gray-800 dark:text-red-400",
                message,
                String::new(),
            ),
        };

        html! {
            div id="alert-container" hx-swap-oob="true"
            {
                div class=(container_style) role="alert"
                {
                    p class="text-sm font-medium" { (message) }

                    @if !details.is_empty()
                    {
                        p class="mt-1 text-sm opacity-80" { (details) }
                    }
                }
            }
        }
    }
}

impl IntoResponse for Alert {
    fn into_response(self) -> Response {
        self.into_html().into_response()
    }
}
