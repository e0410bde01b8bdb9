//! Pages and endpoints for creating, editing and deleting individual expenses.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{Extension, FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::Form;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::Connection;
use serde::Deserialize;
use time::{Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    AppState, Error,
    endpoints::{self, format_endpoint},
    expense::{
        DatabaseId, ExpenseUpdate, NewExpense, create_expense, delete_expense, get_expense,
        update_expense, validate_expense_all,
    },
    html::{
        BUTTON_PRIMARY_STYLE, FORM_LABEL_STYLE, FORM_TEXT_INPUT_STYLE, PAGE_CONTAINER_STYLE, base,
        loading_indicator,
    },
    navigation::NavBar,
    timezone::get_local_offset,
    user::UserID,
};

/// The categories offered in the expense forms.
///
/// The storage layer accepts any non-empty category, so imported expenses may
/// use labels outside this list.
pub const CATEGORIES: [&str; 4] = ["Transport", "Utilities", "Groceries", "Entertainment"];

/// The date format used by the date input, e.g. "2024-06-15".
const DATE_INPUT_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

/// The state needed for the expense create and edit flows.
#[derive(Debug, Clone)]
pub struct ExpenseFormState {
    /// The database connection for managing expenses.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for ExpenseFormState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

// ============================================================================
// TEMPLATES
// ============================================================================

enum FormMode {
    Create,
    Edit(DatabaseId),
}

struct ExpenseFormValues {
    date: String,
    amount: Option<f64>,
    description: String,
    category: String,
}

impl ExpenseFormValues {
    fn empty(default_date: Date) -> Self {
        Self {
            date: default_date.to_string(),
            amount: None,
            description: String::new(),
            category: String::new(),
        }
    }
}

fn expense_form(mode: &FormMode, values: &ExpenseFormValues, errors: &[String]) -> Markup {
    let (hx_post, hx_put, submit_label) = match mode {
        FormMode::Create => (Some(endpoints::EXPENSES_API.to_owned()), None, "Save Expense"),
        FormMode::Edit(expense_id) => (
            None,
            Some(format_endpoint(endpoints::EXPENSE, *expense_id)),
            "Update Expense",
        ),
    };

    html! {
        form
            id="expense-form"
            hx-post=[hx_post]
            hx-put=[hx_put]
            hx-target="#expense-form"
            hx-swap="outerHTML"
            hx-indicator="#indicator"
            class="space-y-4 md:space-y-6 w-full max-w-md"
        {
            div
            {
                label for="date" class=(FORM_LABEL_STYLE) { "Date" }

                input
                    type="date"
                    name="date"
                    id="date"
                    class=(FORM_TEXT_INPUT_STYLE)
                    value=(values.date);
            }

            div
            {
                label for="amount" class=(FORM_LABEL_STYLE) { "Amount" }

                input
                    type="number"
                    name="amount"
                    id="amount"
                    step="0.01"
                    min="0.01"
                    placeholder="0.00"
                    class=(FORM_TEXT_INPUT_STYLE)
                    required
                    value=[values.amount.map(|amount| amount.to_string())];
            }

            div
            {
                label for="description" class=(FORM_LABEL_STYLE) { "Description" }

                input
                    type="text"
                    name="description"
                    id="description"
                    maxlength="255"
                    class=(FORM_TEXT_INPUT_STYLE)
                    required
                    value=(values.description);
            }

            div
            {
                label for="category" class=(FORM_LABEL_STYLE) { "Category" }

                select
                    name="category"
                    id="category"
                    class=(FORM_TEXT_INPUT_STYLE)
                    required
                {
                    @for category in CATEGORIES
                    {
                        option value=(category) selected[category == values.category]
                        {
                            (category)
                        }
                    }
                }
            }

            @if !errors.is_empty()
            {
                ul class="text-red-500 text-base list-disc list-inside"
                {
                    @for error in errors
                    {
                        li { (error) }
                    }
                }
            }

            button
                type="submit" id="submit-button" tabindex="0"
                class=(BUTTON_PRIMARY_STYLE)
            {
                (loading_indicator())
                (submit_label)
            }
        }
    }
}

fn expense_form_page(title: &str, active_endpoint: &str, form: Markup) -> Response {
    let nav_bar = NavBar::new(active_endpoint).into_html();

    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-6" { (title) }

            (form)
        }
    };

    base(title, &content).into_response()
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The form data for creating or updating an expense.
///
/// The date is taken as a raw string so that an empty value can fall back to
/// today's date.
#[derive(Debug, Deserialize)]
pub struct ExpenseForm {
    /// The day the money was spent, as "YYYY-MM-DD", or empty for today.
    #[serde(default)]
    pub date: String,
    /// The amount of money spent, in dollars.
    pub amount: f64,
    /// A text description of what the money was spent on.
    pub description: String,
    /// The label the expense is grouped under.
    pub category: String,
}

const INVALID_DATE_ERROR_MSG: &str = "Date must be a valid date in the format YYYY-MM-DD.";

enum FormDate {
    Parsed(Date),
    Invalid,
}

fn parse_form_date(raw_date: &str, local_timezone: &str) -> Result<FormDate, Error> {
    let raw_date = raw_date.trim();

    if raw_date.is_empty() {
        let offset = get_local_offset(local_timezone)
            .ok_or_else(|| Error::InvalidTimezoneError(local_timezone.to_owned()))?;

        return Ok(FormDate::Parsed(
            OffsetDateTime::now_utc().to_offset(offset).date(),
        ));
    }

    match Date::parse(raw_date, DATE_INPUT_FORMAT) {
        Ok(date) => Ok(FormDate::Parsed(date)),
        Err(_) => Ok(FormDate::Invalid),
    }
}

/// Display the page for recording a new expense.
pub async fn get_new_expense_page(State(state): State<ExpenseFormState>) -> Response {
    let Some(offset) = get_local_offset(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone.clone()).into_response();
    };

    let today = OffsetDateTime::now_utc().to_offset(offset).date();
    let form = expense_form(&FormMode::Create, &ExpenseFormValues::empty(today), &[]);

    expense_form_page("New Expense", endpoints::EXPENSES_VIEW, form)
}

/// A route handler for creating a new expense.
///
/// On success the client is redirected to the expenses listing. On a
/// validation failure the form is re-rendered with every failed rule listed.
pub async fn create_expense_endpoint(
    State(state): State<ExpenseFormState>,
    Extension(user_id): Extension<UserID>,
    Form(data): Form<ExpenseForm>,
) -> Response {
    let description = data.description.trim().to_owned();
    let category = data.category.trim().to_owned();

    let values = ExpenseFormValues {
        date: data.date.trim().to_owned(),
        amount: Some(data.amount),
        description: description.clone(),
        category: category.clone(),
    };

    let date = match parse_form_date(&data.date, &state.local_timezone) {
        Ok(FormDate::Parsed(date)) => date,
        Ok(FormDate::Invalid) => {
            return expense_form(
                &FormMode::Create,
                &values,
                &[INVALID_DATE_ERROR_MSG.to_owned()],
            )
            .into_response();
        }
        Err(error) => return error.into_response(),
    };

    let errors: Vec<String> = validate_expense_all(data.amount, &description, &category)
        .iter()
        .map(ToString::to_string)
        .collect();

    if !errors.is_empty() {
        return expense_form(&FormMode::Create, &values, &errors).into_response();
    }

    let result = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_alert_response();
            }
        };

        create_expense(
            NewExpense {
                user_id,
                date,
                category,
                amount: data.amount,
                description,
            },
            &connection,
        )
    };

    match result {
        Ok(_) => (
            HxRedirect(endpoints::EXPENSES_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => error.into_alert_response(),
    }
}

/// Display the page for editing an existing expense.
///
/// Responds with 404 if the expense does not exist and 403 if it belongs to
/// another user.
pub async fn get_edit_expense_page(
    State(state): State<ExpenseFormState>,
    Extension(user_id): Extension<UserID>,
    Path(expense_id): Path<DatabaseId>,
) -> Response {
    let expense = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        match get_expense(expense_id, &connection) {
            Ok(expense) => expense,
            Err(error) => return error.into_response(),
        }
    };

    if expense.user_id != user_id {
        return Error::Forbidden.into_response();
    }

    let values = ExpenseFormValues {
        date: expense.date.to_string(),
        amount: Some(expense.amount()),
        description: expense.description.clone(),
        category: expense.category.clone(),
    };
    let form = expense_form(&FormMode::Edit(expense.id), &values, &[]);

    expense_form_page("Edit Expense", endpoints::EXPENSES_VIEW, form)
}

/// A route handler for updating an existing expense.
///
/// The stored amount is always recomputed from the submitted dollar amount.
pub async fn update_expense_endpoint(
    State(state): State<ExpenseFormState>,
    Extension(user_id): Extension<UserID>,
    Path(expense_id): Path<DatabaseId>,
    Form(data): Form<ExpenseForm>,
) -> Response {
    let description = data.description.trim().to_owned();
    let category = data.category.trim().to_owned();

    let values = ExpenseFormValues {
        date: data.date.trim().to_owned(),
        amount: Some(data.amount),
        description: description.clone(),
        category: category.clone(),
    };

    let date = match parse_form_date(&data.date, &state.local_timezone) {
        Ok(FormDate::Parsed(date)) => date,
        Ok(FormDate::Invalid) => {
            return expense_form(
                &FormMode::Edit(expense_id),
                &values,
                &[INVALID_DATE_ERROR_MSG.to_owned()],
            )
            .into_response();
        }
        Err(error) => return error.into_response(),
    };

    let errors: Vec<String> = validate_expense_all(data.amount, &description, &category)
        .iter()
        .map(ToString::to_string)
        .collect();

    if !errors.is_empty() {
        return expense_form(&FormMode::Edit(expense_id), &values, &errors).into_response();
    }

    let result = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_alert_response();
            }
        };

        match get_expense(expense_id, &connection) {
            Ok(expense) if expense.user_id != user_id => Err(Error::Forbidden),
            Ok(_) => update_expense(
                expense_id,
                ExpenseUpdate {
                    date,
                    category,
                    amount: data.amount,
                    description,
                },
                &connection,
            ),
            Err(Error::NotFound) => Err(Error::UpdateMissingExpense),
            Err(error) => Err(error),
        }
    };

    match result {
        Ok(_) => (
            HxRedirect(endpoints::EXPENSES_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => error.into_alert_response(),
    }
}

/// A route handler for deleting an expense.
pub async fn delete_expense_endpoint(
    State(state): State<ExpenseFormState>,
    Extension(user_id): Extension<UserID>,
    Path(expense_id): Path<DatabaseId>,
) -> Response {
    let result = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_alert_response();
            }
        };

        match get_expense(expense_id, &connection) {
            Ok(expense) if expense.user_id != user_id => Err(Error::Forbidden),
            Ok(expense) => delete_expense(expense.id, &connection),
            Err(Error::NotFound) => Err(Error::DeleteMissingExpense),
            Err(error) => Err(error),
        }
    };

    match result {
        Ok(()) => (
            HxRedirect(endpoints::EXPENSES_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => error.into_alert_response(),
    }
}

/// A route handler for getting an expense by its database ID as JSON.
///
/// This function will return the status code 404 if the requested resource
/// does not exist and 403 if it belongs to another user.
pub async fn get_expense_endpoint(
    State(state): State<ExpenseFormState>,
    Extension(user_id): Extension<UserID>,
    Path(expense_id): Path<DatabaseId>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_expense(expense_id, &connection) {
        Ok(expense) if expense.user_id == user_id => {
            (StatusCode::OK, Json(expense)).into_response()
        }
        Ok(_) => Error::Forbidden.into_response(),
        Err(error) => error.into_response(),
    }
}
