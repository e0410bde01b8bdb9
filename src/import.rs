//! Importing expenses from an uploaded CSV file.
//!
//! Each line of the file is one candidate expense in the shape
//! `date,amount,description,category`. Rows that cannot be parsed or that
//! fail validation are skipped silently; the import reports how many rows
//! were persisted. The whole import runs inside one database transaction, so
//! an unexpected storage failure rolls back every row.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Extension, FromRef, Multipart, State, multipart::Field},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::html;
use rusqlite::Connection;
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AppState, Error,
    alert::Alert,
    endpoints,
    expense::{NewExpense, create_expense, validate_expense},
    html::{
        BUTTON_PRIMARY_STYLE, FORM_TEXT_INPUT_STYLE, PAGE_CONTAINER_STYLE, base, loading_indicator,
    },
    navigation::NavBar,
    user::UserID,
};

/// The date format expected in the first CSV field, e.g. "2024-06-15".
const DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// The state needed for importing expenses.
#[derive(Debug, Clone)]
pub struct ImportState {
    /// The database connection for persisting expenses.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ImportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

// ============================================================================
// IMPORT PAGE
// ============================================================================

/// Route handler for the import CSV page.
pub async fn get_import_page() -> Response {
    let nav_bar = NavBar::new(endpoints::IMPORT_VIEW).into_html();

    let form = html! {
        form
            hx-post=(endpoints::IMPORT)
            enctype="multipart/form-data"
            hx-disabled-elt="#file, #submit-button"
            hx-indicator="#indicator"
            hx-swap="none"
            hx-target-error="#alert-container"
            class="space-y-4 md:space-y-6"
        {
            div
            {
                label
                    for="file"
                    class="block mb-2 text-sm font-medium text-gray-900 dark:text-white"
                {
                    "Choose a file to upload"
                }

                input
                    id="file"
                    type="file"
                    name="file"
                    accept="text/csv"
                    required
                    class=(FORM_TEXT_INPUT_STYLE);

                p
                {
                    "Upload a CSV file with one expense per line in the format "
                    code { "date,amount,description,category" }
                    ". Lines that cannot be read are skipped."
                }
            }

            button
                type="submit"
                id="submit-button"
                class=(BUTTON_PRIMARY_STYLE)
            {
                (loading_indicator())
                " Upload File"
            }
        }
    };

    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            div class="relative"
            {
                (form)
            }
        }
    };

    base("Import Expenses", &content).into_response()
}

// ============================================================================
// IMPORT ENDPOINT
// ============================================================================

/// Route handler for importing expenses from an uploaded CSV file.
///
/// The upload must be a multipart form with one `text/csv` field named
/// `file`. The rows are imported inside a single transaction: row-level
/// problems only reduce the reported count, while a storage failure rolls
/// back the entire import.
pub async fn import_expenses(
    State(state): State<ImportState>,
    Extension(user_id): Extension<UserID>,
    mut multipart: Multipart,
) -> Result<Response, Response> {
    let csv_text = read_csv_field(&mut multipart)
        .await
        .map_err(|error| error.into_alert_response())?;

    let connection = state.db_connection.lock().map_err(|error| {
        tracing::error!("could not acquire database lock: {error}");
        Error::DatabaseLockError.into_alert_response()
    })?;

    let tx = connection
        .unchecked_transaction()
        .inspect_err(|error| tracing::error!("could not start transaction: {error}"))
        .map_err(|error| Error::from(error).into_alert_response())?;

    let imported_count = import_expenses_from_text(user_id, &csv_text, &tx)
        .inspect_err(|error| tracing::error!("Failed to import expenses: {error}"))
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Alert::Error {
                    message: "Import failed".to_owned(),
                    details: "An unexpected error occurred and no expenses were imported. \
                        Please try again later."
                        .to_owned(),
                }
                .into_html(),
            )
                .into_response()
        })?;

    tx.commit()
        .inspect_err(|error| tracing::error!("could not commit transaction: {error}"))
        .map_err(|error| Error::from(error).into_alert_response())?;

    let alert = match imported_count {
        0 => Alert::Success {
            message: "Import completed".to_owned(),
            details: "No expenses were imported. Check that the file has rows in the format \
                date,amount,description,category."
                .to_owned(),
        },
        count => Alert::Success {
            message: "Import completed successfully!".to_owned(),
            details: format!("Imported {count} expenses."),
        },
    };

    tracing::info!("Imported {imported_count} expenses for user {user_id}");

    Ok((StatusCode::CREATED, alert.into_html()).into_response())
}

async fn read_csv_field(multipart: &mut Multipart) -> Result<String, Error> {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return Err(Error::UploadFailed),
        Err(error) => {
            tracing::error!("Could not read multipart form field: {error}");
            return Err(Error::UploadFailed);
        }
    };

    parse_multipart_field(field).await
}

async fn parse_multipart_field(field: Field<'_>) -> Result<String, Error> {
    if field.content_type() != Some("text/csv") {
        return Err(Error::NotCsv);
    }

    let file_name = field.file_name().unwrap_or("<unnamed>").to_owned();

    match field.text().await {
        Ok(data) => {
            tracing::debug!("Received file '{}' that is {} bytes", file_name, data.len());

            Ok(data)
        }
        Err(error) => {
            tracing::error!("Could not read data from multipart form field: {error}");
            Err(Error::UploadFailed)
        }
    }
}

// ============================================================================
// IMPORT PIPELINE
// ============================================================================

/// Import expenses for `user_id` from CSV `text`, returning how many rows
/// were persisted.
///
/// Each line is handled independently:
/// - blank lines are skipped,
/// - lines with fewer than four CSV fields are skipped (extra trailing
///   fields are ignored),
/// - lines whose date is not `YYYY-MM-DD` or whose amount is not a number
///   are skipped,
/// - lines that fail expense validation are skipped.
///
/// None of these reduce the import to an error; they only reduce the count.
///
/// **Note**: If you want transactional integrity (all or nothing), pass in a
/// transaction for `connection`.
///
/// # Errors
/// Returns an [Error::SqlError] if a row could not be persisted. The caller
/// is expected to roll back its transaction in that case.
pub fn import_expenses_from_text(
    user_id: UserID,
    text: &str,
    connection: &Connection,
) -> Result<usize, Error> {
    let mut imported_count = 0;

    for line in text.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(record) = parse_csv_row(line) else {
            continue;
        };

        if record.len() < 4 {
            continue;
        }

        let Ok(date) = Date::parse(record[0].trim(), DATE_FORMAT) else {
            continue;
        };

        let Ok(amount) = record[1].trim().parse::<f64>() else {
            continue;
        };

        let description = record[2].trim();
        let category = record[3].trim();

        if validate_expense(amount, description, category).is_err() {
            continue;
        }

        create_expense(
            NewExpense {
                user_id,
                date,
                category: category.to_owned(),
                amount,
                description: description.to_owned(),
            },
            connection,
        )?;

        imported_count += 1;
    }

    Ok(imported_count)
}

/// Parse a single line as one CSV record with standard double-quote escaping.
///
/// Returns `None` if the line is not a readable CSV record.
fn parse_csv_row(line: &str) -> Option<csv::StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Some(record),
        _ => None,
    }
}



#[cfg(test)]
mod import_page_tests {
    use axum::http::StatusCode;

    use crate::{
        endpoints,
        test_utils::{assert_content_type, assert_valid_html, parse_html_document},
    };

    use super::get_import_page;

    #[tokio::test]
    async fn render_page() {
        let response = get_import_page().await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_content_type(&response, "text/html; charset=utf-8");

        let html = parse_html_document(response).await;
        assert_valid_html(&html);

        let form_selector = scraper::Selector::parse("form").unwrap();
        let form = html
            .select(&form_selector)
            .next()
            .expect("No form found on import page");

        assert_eq!(form.value().attr("hx-post"), Some(endpoints::IMPORT));
        assert_eq!(form.value().attr("enctype"), Some("multipart/form-data"));

        let input_selector = scraper::Selector::parse("input[type=file][name=file]").unwrap();
        assert!(
            form.select(&input_selector).next().is_some(),
            "want a file input named 'file' in the import form"
        );
    }
}
