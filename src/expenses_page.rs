//! The paginated expense listing page with its year/month filter.

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
    endpoints::{self, format_endpoint},
    expense::{Expense, ExpenseFilter, count_expenses, list_expenditure_years, query_expenses},
    html::{
        BUTTON_DELETE_STYLE, FORM_TEXT_INPUT_STYLE, LINK_STYLE, PAGE_CONTAINER_STYLE,
        TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE, base, format_currency, link,
        month_name,
    },
    navigation::NavBar,
    pagination::{
        PaginationConfig, PaginationIndicator, compute_page_bounds, create_pagination_indicators,
    },
    timezone::get_local_offset,
    user::UserID,
};

/// The state needed for the expense listing page.
#[derive(Debug, Clone)]
pub struct ExpensesPageState {
    /// The database connection for querying expenses.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    pub local_timezone: String,
    /// The config that controls how to display pages of data.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for ExpensesPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The query parameters accepted by the expense listing page.
#[derive(Debug, Default, Deserialize)]
pub struct ExpensesQuery {
    /// The calendar year to list expenses for, defaults to the current year.
    pub year: Option<i32>,
    /// The calendar month to list expenses for, defaults to the current month.
    pub month: Option<u8>,
    /// The one-based page number, defaults to the first page.
    pub page: Option<u64>,
}

/// Display a page of the user's expenses for the selected month.
pub async fn get_expenses_page(
    State(state): State<ExpensesPageState>,
    Extension(user_id): Extension<UserID>,
    Query(query): Query<ExpensesQuery>,
) -> Response {
    let Some(offset) = get_local_offset(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone.clone()).into_response();
    };
    let today = OffsetDateTime::now_utc().to_offset(offset).date();

    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or(today.month() as u8);
    let page = query
        .page
        .filter(|&page| page >= 1)
        .unwrap_or(state.pagination_config.default_page);
    let page_size = state.pagination_config.default_page_size;

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

    let total_count = match count_expenses(&filter, &connection) {
        Ok(count) => count,
        Err(error) => return error.into_response(),
    };
    let bounds = compute_page_bounds(page, page_size, total_count);

    let expenses = match query_expenses(&filter, bounds.offset, page_size, &connection) {
        Ok(expenses) => expenses,
        Err(error) => return error.into_response(),
    };
    let years = match list_expenditure_years(user_id, &connection) {
        Ok(years) => years,
        Err(error) => return error.into_response(),
    };

    let indicators = create_pagination_indicators(
        page,
        bounds.total_pages,
        state.pagination_config.max_pages,
    );

    let nav_bar = NavBar::new(endpoints::EXPENSES_VIEW).into_html();

    let content = html! {
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-2" { "Expenses" }
            p class="mb-4" { (month_name(month)) " " (year) " · " (total_count) " expenses" }

            div class="flex gap-4 mb-4"
            {
                (link(endpoints::NEW_EXPENSE_VIEW, "Add expense"))
                (link(endpoints::IMPORT_VIEW, "Import from CSV"))
            }

            (filter_form(year, month, &years))

            @if expenses.is_empty()
            {
                p class="my-8" { "No expenses recorded for this month." }
            }
            @else
            {
                (expenses_table(&expenses))
            }

            (pagination_strip(&indicators, year, month))
        }
    };

    base("Expenses", &content).into_response()
}

fn filter_form(selected_year: i32, selected_month: u8, years: &[i32]) -> Markup {
    // A user with no expenses still needs the current year as an option.
    let has_selected_year = years.contains(&selected_year);

    html! {
        form method="get" action=(endpoints::EXPENSES_VIEW) class="flex items-end gap-2 mb-4"
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
                "Filter"
            }
        }
    }
}

fn expenses_table(expenses: &[Expense]) -> Markup {
    html! {
        table class="w-full text-sm text-left text-gray-500 dark:text-gray-400"
        {
            thead class=(TABLE_HEADER_STYLE)
            {
                tr
                {
                    th scope="col" class=(TABLE_CELL_STYLE) { "Date" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Category" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Description" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Amount" }
                    th scope="col" class=(TABLE_CELL_STYLE) { "Actions" }
                }
            }

            tbody
            {
                @for expense in expenses
                {
                    tr class=(TABLE_ROW_STYLE)
                    {
                        td class=(TABLE_CELL_STYLE) { (expense.date) }
                        td class=(TABLE_CELL_STYLE) { (expense.category) }
                        td class=(TABLE_CELL_STYLE) { (expense.description) }
                        td class=(TABLE_CELL_STYLE) { (format_currency(expense.amount())) }
                        td class=(TABLE_CELL_STYLE)
                        {
                            a
                                href=(format_endpoint(endpoints::EDIT_EXPENSE_VIEW, expense.id))
                                class=(LINK_STYLE)
                            {
                                "Edit"
                            }

                            " "

                            button
                                hx-delete=(format_endpoint(endpoints::EXPENSE, expense.id))
                                hx-confirm="Delete this expense?"
                                hx-target-error="#alert-container"
                                class=(BUTTON_DELETE_STYLE)
                            {
                                "Delete"
                            }
                        }
                    }
                }
            }
        }
    }
}

fn pagination_strip(indicators: &[PaginationIndicator], year: i32, month: u8) -> Markup {
    let page_url =
        |page: u64| format!("{}?year={year}&month={month}&page={page}", endpoints::EXPENSES_VIEW);

    html! {
        nav class="flex items-center gap-2 mt-4" aria-label="Pagination"
        {
            @for indicator in indicators
            {
                @match indicator
                {
                    PaginationIndicator::BackButton(page) =>
                    {
                        a href=(page_url(*page)) class=(LINK_STYLE) { "Previous" }
                    }
                    PaginationIndicator::Page(page) =>
                    {
                        a href=(page_url(*page)) class=(LINK_STYLE) { (page) }
                    }
                    PaginationIndicator::CurrPage(page) =>
                    {
                        span class="font-bold" { (page) }
                    }
                    PaginationIndicator::Ellipsis =>
                    {
                        span { "…" }
                    }
                    PaginationIndicator::NextButton(page) =>
                    {
                        a href=(page_url(*page)) class=(LINK_STYLE) { "Next" }
                    }
                }
            }
        }
    }
}
