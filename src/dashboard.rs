//! The monthly summary dashboard: totals, per-category breakdowns and budget
//! alerts.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Extension, FromRef, Query, State},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    budget::{BudgetAlert, generate_budget_alerts},
    endpoints,
    expense::{
        CategoryAmount, ExpenseFilter, average_expenses_by_category, list_expenditure_years,
        sum_expenses, sum_expenses_by_category,
    },
    html::{
        FORM_TEXT_INPUT_STYLE, PAGE_CONTAINER_STYLE, TABLE_CELL_STYLE, TABLE_HEADER_STYLE,
        TABLE_ROW_STYLE, base, format_currency, month_name,
    },
    navigation::NavBar,
    timezone::get_local_offset,
    user::UserID,
};

/// The state needed for displaying the dashboard page.
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// The database connection for aggregating expenses.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// The query parameters accepted by the dashboard page.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// The calendar year to summarise, defaults to the current year.
    pub year: Option<i32>,
    /// The calendar month to summarise, defaults to the current month.
    pub month: Option<u8>,
}

/// Display the monthly summary for the selected year and month.
///
/// Budget alerts are only evaluated when the selected month is the current
/// calendar month in the configured local timezone.
pub async fn get_dashboard_page(
    State(state): State<DashboardState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let Some(offset) = get_local_offset(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone.clone()).into_response();
    };
    let today = OffsetDateTime::now_utc().to_offset(offset).date();

    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or(today.month() as u8);

    let filter = ExpenseFilter {
        user_id,
        year: Some(year),
        month: Some(month),
        category: None,
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    let total = match sum_expenses(&filter, &connection) {
        Ok(total) => total,
        Err(error) => return error.into_response(),
    };
    let category_totals = match sum_expenses_by_category(&filter, &connection) {
        Ok(totals) => totals,
        Err(error) => return error.into_response(),
    };
    let category_averages = match average_expenses_by_category(&filter, &connection) {
        Ok(averages) => averages,
        Err(error) => return error.into_response(),
    };
    let years = match list_expenditure_years(user_id, &connection) {
        Ok(years) => years,
        Err(error) => return error.into_response(),
    };

    let is_current_month = year == today.year() && month == today.month() as u8;
    let alerts = if is_current_month {
        generate_budget_alerts(&category_totals)
    } else {
        Vec::new()
    };

    let nav_bar = NavBar::new(endpoints::DASHBOARD_VIEW).into_html();

    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-2" { "Dashboard" }

            (filter_form(year, month, &years))

            (alerts_section(&alerts))

            p class="text-lg my-4"
            {
                "Total spent in " (month_name(month)) " " (year) ": "
                span class="font-bold" { (format_currency(total)) }
            }

            div class="flex flex-col lg:flex-row gap-8"
            {
                (category_table("Spending by category", "Total", &category_totals))
                (category_table("Average expense by category", "Average", &category_averages))
            }
        }
    };

    base("Dashboard", &content).into_response()
}

fn filter_form(selected_year: i32, selected_month: u8, years: &[i32]) -> Markup {
    let has_selected_year = years.contains(&selected_year);

    html! {
        form method="get" action=(endpoints::DASHBOARD_VIEW) class="flex items-end gap-2 mb-4"
        {
            div
            {
                label for="year" class="block mb-1 text-sm" { "Year" }

                select name="year" id="year" class=(FORM_TEXT_INPUT_STYLE)
                {
                    @if !has_selected_year
                    {
                        option value=(selected_year) selected { (selected_year) }
                    }

                    @for year in years
                    {
                        option value=(year) selected[*year == selected_year] { (year) }
                    }
                }
            }

            div
            {
                label for="month" class="block mb-1 text-sm" { "Month" }

                select name="month" id="month" class=(FORM_TEXT_INPUT_STYLE)
                {
                    @for month in 1..=12u8
                    {
                        option value=(month) selected[month == selected_month]
                        {
                            (month_name(month))
                        }
                    }
                }
            }

            button
                type="submit"
                class="px-4 py-2.5 bg-blue-500 dark:bg-blue-600 hover:bg-blue-600 text-white rounded text-sm"
            {
                "Show"
            }
        }
    }
}

fn alerts_section(alerts: &[BudgetAlert]) -> Markup {
    html! {
        @for alert in alerts
        {
            div
                role="alert"
                class="w-full max-w-md p-4 mb-2 rounded border border-red-300 bg-red-50 \
                    text-red-800 dark:border-red-800 dark:bg-gray-800 dark:text-red-400"
            {
                "Over budget in " (alert.category) " by " (format_currency(alert.excess)) "."
            }
        }
    }
}

fn category_table(title: &str, value_header: &str, rows: &[CategoryAmount]) -> Markup {
    html! {
        div
        {
            h2 class="text-lg font-bold mb-2" { (title) }

            @if rows.is_empty()
            {
                p { "No expenses recorded for this month." }
            }
            @else
            {
                table class="w-full text-sm text-left text-gray-500 dark:text-gray-400"
                {
                    thead class=(TABLE_HEADER_STYLE)
                    {
                        tr
                        {
                            th scope="col" class=(TABLE_CELL_STYLE) { "Category" }
                            th scope="col" class=(TABLE_CELL_STYLE) { (value_header) }
                        }
                    }

                    tbody
                    {
                        @for row in rows
                        {
                            tr class=(TABLE_ROW_STYLE)
                            {
                                td class=(TABLE_CELL_STYLE) { (row.category) }
                                td class=(TABLE_CELL_STYLE) { (format_currency(row.amount)) }
                            }
                        }
                    }
                }
            }
        }
    }
}
