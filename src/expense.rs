//! Expense management for the application.
//!
//! This module contains everything related to expenses:
//! - The `Expense` model and the `NewExpense`/`ExpenseUpdate` value types
//! - Domain validation for candidate expenses
//! - Database functions for storing, querying and aggregating expenses

use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Error, money, user::UserID};

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The longest description the validation layer accepts, in bytes.
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

// ============================================================================
// MODELS
// ============================================================================

/// A single recorded expense.
///
/// The canonical representation of the amount is [Expense::amount_cents];
/// the decimal dollar amount is derived via [Expense::amount].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    /// The ID of the expense in the application database.
    pub id: DatabaseId,
    /// The ID of the user the expense belongs to.
    pub user_id: UserID,
    /// The day the money was spent.
    pub date: Date,
    /// The label the expense is grouped under.
    pub category: String,
    /// The amount of money spent, in whole cents. Always greater than zero.
    pub amount_cents: i64,
    /// A text description of what the money was spent on.
    pub description: String,
}

impl Expense {
    /// The amount of money spent, in dollars.
    pub fn amount(&self) -> f64 {
        money::to_dollars(self.amount_cents)
    }
}

/// A candidate expense that has not been persisted yet.
///
/// The dollar `amount` is converted to cents on insert; `amount_cents` is
/// never set directly.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    /// The ID of the user the expense will belong to.
    pub user_id: UserID,
    /// The day the money was spent.
    pub date: Date,
    /// The label the expense is grouped under.
    pub category: String,
    /// The amount of money spent, in dollars.
    pub amount: f64,
    /// A text description of what the money was spent on.
    pub description: String,
}

/// The replacement field values for an existing expense.
///
/// Consumed by [update_expense], which re-validates the fields and recomputes
/// the stored cents from the dollar `amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseUpdate {
    /// The day the money was spent.
    pub date: Date,
    /// The label the expense is grouped under.
    pub category: String,
    /// The amount of money spent, in dollars.
    pub amount: f64,
    /// A text description of what the money was spent on.
    pub description: String,
}

/// A per-category aggregate (sum or average) in dollars.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAmount {
    /// The expense category.
    pub category: String,
    /// The aggregated dollar amount.
    pub amount: f64,
}

// ============================================================================
// VALIDATION
// ============================================================================

/// The reasons a candidate expense can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The amount was zero or negative.
    #[error("amount must be greater than zero")]
    InvalidAmount,
    /// The description was empty after trimming.
    #[error("description is required")]
    MissingDescription,
    /// The category was empty after trimming.
    #[error("category is required")]
    MissingCategory,
    /// The description was longer than [MAX_DESCRIPTION_LENGTH] bytes.
    #[error("description must be at most 255 characters")]
    DescriptionTooLong,
}

/// Check a candidate expense against the domain rules, reporting the first
/// rule that fails.
///
/// The rules are checked in a fixed order: amount, description presence,
/// category presence, description length. The CSV import uses this function
/// to reject rows. Form endpoints that want every failure at once should use
/// [validate_expense_all].
pub fn validate_expense(
    amount: f64,
    description: &str,
    category: &str,
) -> Result<(), ValidationError> {
    if amount <= 0.0 {
        return Err(ValidationError::InvalidAmount);
    }

    if description.trim().is_empty() {
        return Err(ValidationError::MissingDescription);
    }

    if category.trim().is_empty() {
        return Err(ValidationError::MissingCategory);
    }

    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong);
    }

    Ok(())
}

/// Check a candidate expense against the domain rules, collecting every rule
/// that fails in rule order.
///
/// Returns an empty vector when the candidate is valid.
pub fn validate_expense_all(amount: f64, description: &str, category: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if amount <= 0.0 {
        errors.push(ValidationError::InvalidAmount);
    }

    if description.trim().is_empty() {
        errors.push(ValidationError::MissingDescription);
    }

    if category.trim().is_empty() {
        errors.push(ValidationError::MissingCategory);
    }

    if description.len() > MAX_DESCRIPTION_LENGTH {
        errors.push(ValidationError::DescriptionTooLong);
    }

    errors
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the expense table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_expense_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS expense (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                category TEXT NOT NULL,
                amount_cents INTEGER NOT NULL,
                description TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
                )",
        (),
    )?;

    Ok(())
}

pub(crate) fn map_expense_row(row: &Row) -> Result<Expense, rusqlite::Error> {
    Ok(Expense {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        date: row.get(2)?,
        category: row.get(3)?,
        amount_cents: row.get(4)?,
        description: row.get(5)?,
    })
}

/// Validate a new expense and insert it into the database.
///
/// The dollar amount is converted to cents with [money::to_cents] before it
/// is stored.
///
/// # Errors
/// This function will return an:
/// - [Error::InvalidExpense] if the candidate fails a validation rule,
/// - [Error::SqlError] if there is some other SQL error.
pub fn create_expense(new_expense: NewExpense, connection: &Connection) -> Result<Expense, Error> {
    validate_expense(
        new_expense.amount,
        &new_expense.description,
        &new_expense.category,
    )?;

    let amount_cents = money::to_cents(new_expense.amount);

    let expense = connection
        .prepare(
            "INSERT INTO expense (user_id, date, category, amount_cents, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, user_id, date, category, amount_cents, description",
        )?
        .query_row(
            (
                new_expense.user_id.as_i64(),
                new_expense.date,
                new_expense.category,
                amount_cents,
                new_expense.description,
            ),
            map_expense_row,
        )?;

    Ok(expense)
}

/// Retrieve an expense from the database by its `id`.
///
/// # Errors
/// This function will return an:
/// - [Error::NotFound] if `id` does not refer to a valid expense,
/// - [Error::SqlError] if there is some other SQL error.
pub fn get_expense(id: DatabaseId, connection: &Connection) -> Result<Expense, Error> {
    let expense = connection
        .prepare(
            "SELECT id, user_id, date, category, amount_cents, description \
            FROM expense WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_expense_row)?;

    Ok(expense)
}

/// Validate `update` and overwrite the expense `id` with its fields.
///
/// The stored cents are always recomputed from the dollar amount in `update`.
/// The owner of the expense is not changed.
///
/// # Errors
/// This function will return an:
/// - [Error::InvalidExpense] if `update` fails a validation rule,
/// - [Error::UpdateMissingExpense] if `id` does not refer to a valid expense,
/// - [Error::SqlError] if there is some other SQL error.
pub fn update_expense(
    id: DatabaseId,
    update: ExpenseUpdate,
    connection: &Connection,
) -> Result<Expense, Error> {
    validate_expense(update.amount, &update.description, &update.category)?;

    let amount_cents = money::to_cents(update.amount);

    connection
        .prepare(
            "UPDATE expense
             SET date = ?1, category = ?2, amount_cents = ?3, description = ?4
             WHERE id = ?5
             RETURNING id, user_id, date, category, amount_cents, description",
        )?
        .query_row(
            (update.date, update.category, amount_cents, update.description, id),
            map_expense_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingExpense,
            error => error.into(),
        })
}

/// Delete the expense with `id` from the database.
///
/// # Errors
/// This function will return an:
/// - [Error::DeleteMissingExpense] if `id` does not refer to a valid expense,
/// - [Error::SqlError] if there is some other SQL error.
pub fn delete_expense(id: DatabaseId, connection: &Connection) -> Result<(), Error> {
    let rows_deleted = connection.execute("DELETE FROM expense WHERE id = ?1", (id,))?;

    if rows_deleted == 0 {
        return Err(Error::DeleteMissingExpense);
    }

    Ok(())
}

/// Selects which expenses a query should operate on.
///
/// The owner is always required; year, month and category narrow the
/// selection when set.
#[derive(Debug, Clone)]
pub struct ExpenseFilter {
    /// Only include expenses belonging to this user.
    pub user_id: UserID,
    /// Only include expenses dated in this calendar year.
    pub year: Option<i32>,
    /// Only include expenses dated in this calendar month (1-12).
    pub month: Option<u8>,
    /// Only include expenses with this category.
    pub category: Option<String>,
}

impl ExpenseFilter {
    /// A filter that selects all of `user_id`'s expenses.
    pub fn for_user(user_id: UserID) -> Self {
        Self {
            user_id,
            year: None,
            month: None,
            category: None,
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut conditions = vec!["user_id = ?".to_string()];
        let mut params = vec![Value::Integer(self.user_id.as_i64())];

        if let Some(year) = self.year {
            conditions.push("CAST(strftime('%Y', date) AS INTEGER) = ?".to_string());
            params.push(Value::Integer(year as i64));
        }

        if let Some(month) = self.month {
            conditions.push("CAST(strftime('%m', date) AS INTEGER) = ?".to_string());
            params.push(Value::Integer(month as i64));
        }

        if let Some(category) = &self.category {
            conditions.push("category = ?".to_string());
            params.push(Value::Text(category.clone()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }
}

/// Query for a page of expenses matching `filter`, newest date first.
///
/// Expenses on the same date are returned newest insertion first.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn query_expenses(
    filter: &ExpenseFilter,
    offset: u64,
    limit: u64,
    connection: &Connection,
) -> Result<Vec<Expense>, Error> {
    let (where_clause, mut params) = filter.where_clause();
    let query = format!(
        "SELECT id, user_id, date, category, amount_cents, description FROM expense \
        {where_clause} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
    );
    params.push(Value::Integer(limit as i64));
    params.push(Value::Integer(offset as i64));

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), map_expense_row)?
        .map(|maybe_expense| maybe_expense.map_err(Error::from))
        .collect()
}

/// Count the expenses matching `filter`.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn count_expenses(filter: &ExpenseFilter, connection: &Connection) -> Result<u64, Error> {
    let (where_clause, params) = filter.where_clause();
    let query = format!("SELECT COUNT(*) FROM expense {where_clause}");

    let count: i64 = connection
        .prepare(&query)?
        .query_row(params_from_iter(params), |row| row.get(0))?;

    Ok(count as u64)
}

/// Sum the expenses matching `filter`, in dollars.
///
/// Returns 0.0 when no expenses match.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn sum_expenses(filter: &ExpenseFilter, connection: &Connection) -> Result<f64, Error> {
    let (where_clause, params) = filter.where_clause();
    let query = format!("SELECT COALESCE(SUM(amount_cents), 0) FROM expense {where_clause}");

    let total_cents: i64 = connection
        .prepare(&query)?
        .query_row(params_from_iter(params), |row| row.get(0))?;

    Ok(money::to_dollars(total_cents))
}

/// Sum the expenses matching `filter` grouped by category, in dollars,
/// largest total first.
///
/// Categories with equal totals are ordered by name.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn sum_expenses_by_category(
    filter: &ExpenseFilter,
    connection: &Connection,
) -> Result<Vec<CategoryAmount>, Error> {
    let (where_clause, params) = filter.where_clause();
    let query = format!(
        "SELECT category, SUM(amount_cents) AS total_cents FROM expense {where_clause} \
        GROUP BY category ORDER BY total_cents DESC, category ASC"
    );

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), |row| {
            let category: String = row.get(0)?;
            let total_cents: i64 = row.get(1)?;

            Ok(CategoryAmount {
                category,
                amount: money::to_dollars(total_cents),
            })
        })?
        .map(|maybe_total| maybe_total.map_err(Error::from))
        .collect()
}

/// Average the expenses matching `filter` grouped by category, in dollars,
/// largest average first.
///
/// The mean is taken over the stored cent values and converted to dollars
/// once, so repeated rounding does not drift. Categories with equal averages
/// are ordered by name.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn average_expenses_by_category(
    filter: &ExpenseFilter,
    connection: &Connection,
) -> Result<Vec<CategoryAmount>, Error> {
    let (where_clause, params) = filter.where_clause();
    let query = format!(
        "SELECT category, AVG(amount_cents) AS avg_cents FROM expense {where_clause} \
        GROUP BY category ORDER BY avg_cents DESC, category ASC"
    );

    connection
        .prepare(&query)?
        .query_map(params_from_iter(params), |row| {
            let category: String = row.get(0)?;
            let avg_cents: f64 = row.get(1)?;

            Ok(CategoryAmount {
                category,
                amount: avg_cents / 100.0,
            })
        })?
        .map(|maybe_average| maybe_average.map_err(Error::from))
        .collect()
}

/// List the distinct calendar years in which `user_id` recorded at least one
/// expense, most recent year first.
///
/// Returns an empty vector for a user with no expenses.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn list_expenditure_years(user_id: UserID, connection: &Connection) -> Result<Vec<i32>, Error> {
    connection
        .prepare(
            "SELECT DISTINCT CAST(strftime('%Y', date) AS INTEGER) AS year FROM expense \
            WHERE user_id = :user_id ORDER BY year DESC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], |row| row.get(0))?
        .map(|maybe_year| maybe_year.map_err(Error::from))
        .collect()
}


#[cfg(test)]
mod expense_db_tests {
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error, PasswordHash,
        db::initialize,
        expense::{
            Expense, ExpenseFilter, ExpenseUpdate, NewExpense, ValidationError, count_expenses,
            create_expense, delete_expense, get_expense, query_expenses, update_expense,
        },
        user::{User, UserID, create_user},
    };

    fn init_db_with_user() -> (Connection, User) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let user = create_user("alice", PasswordHash::new_unchecked("hunter2"), &conn)
            .expect("Could not create test user");

        (conn, user)
    }

    fn new_expense(user_id: UserID, amount: f64) -> NewExpense {
        NewExpense {
            user_id,
            date: date!(2024 - 06 - 15),
            category: "Groceries".to_owned(),
            amount,
            description: "Weekly shop".to_owned(),
        }
    }

    #[test]
    fn create_stores_amount_as_cents() {
        let (conn, user) = init_db_with_user();

        let expense = create_expense(new_expense(user.id, 12.34), &conn).unwrap();

        assert!(expense.id > 0);
        assert_eq!(expense.amount_cents, 1234);
        assert_eq!(expense.amount(), 12.34);
        assert_eq!(expense.user_id, user.id);
    }

    #[test]
    fn create_rejects_invalid_amount() {
        let (conn, user) = init_db_with_user();

        let result = create_expense(new_expense(user.id, 0.0), &conn);

        assert_eq!(
            result,
            Err(Error::InvalidExpense(ValidationError::InvalidAmount))
        );
    }

    #[test]
    fn get_returns_created_expense() {
        let (conn, user) = init_db_with_user();
        let created = create_expense(new_expense(user.id, 42.50), &conn).unwrap();

        let fetched = get_expense(created.id, &conn).unwrap();

        assert_eq!(fetched, created);
    }

    #[test]
    fn get_fails_for_unknown_id() {
        let (conn, _) = init_db_with_user();

        assert_eq!(get_expense(1337, &conn), Err(Error::NotFound));
    }

    #[test]
    fn update_recomputes_cents_from_dollars() {
        let (conn, user) = init_db_with_user();
        let created = create_expense(new_expense(user.id, 10.00), &conn).unwrap();

        let updated = update_expense(
            created.id,
            ExpenseUpdate {
                date: date!(2024 - 06 - 16),
                category: "Transport".to_owned(),
                // 10.125 dollars is exactly half way between 1012 and 1013
                // cents; rounding half away from zero gives 1013.
                amount: 10.125,
                description: "Bus fare".to_owned(),
            },
            &conn,
        )
        .unwrap();

        assert_eq!(updated.amount_cents, 1013);
        assert_eq!(updated.category, "Transport");
        assert_eq!(updated.date, date!(2024 - 06 - 16));
        assert_eq!(updated.user_id, user.id, "update must not change the owner");
    }

    #[test]
    fn update_fails_for_unknown_id() {
        let (conn, _) = init_db_with_user();

        let result = update_expense(
            1337,
            ExpenseUpdate {
                date: date!(2024 - 06 - 16),
                category: "Transport".to_owned(),
                amount: 1.0,
                description: "Bus fare".to_owned(),
            },
            &conn,
        );

        assert_eq!(result, Err(Error::UpdateMissingExpense));
    }

    #[test]
    fn update_rejects_invalid_fields() {
        let (conn, user) = init_db_with_user();
        let created = create_expense(new_expense(user.id, 10.00), &conn).unwrap();

        let result = update_expense(
            created.id,
            ExpenseUpdate {
                date: date!(2024 - 06 - 16),
                category: "Transport".to_owned(),
                amount: 1.0,
                description: "".to_owned(),
            },
            &conn,
        );

        assert_eq!(
            result,
            Err(Error::InvalidExpense(ValidationError::MissingDescription))
        );

        let unchanged = get_expense(created.id, &conn).unwrap();
        assert_eq!(unchanged, created);
    }

    #[test]
    fn delete_removes_expense() {
        let (conn, user) = init_db_with_user();
        let created = create_expense(new_expense(user.id, 10.00), &conn).unwrap();

        delete_expense(created.id, &conn).unwrap();

        assert_eq!(get_expense(created.id, &conn), Err(Error::NotFound));
    }

    #[test]
    fn delete_fails_for_unknown_id() {
        let (conn, _) = init_db_with_user();

        assert_eq!(delete_expense(1337, &conn), Err(Error::DeleteMissingExpense));
    }

    fn create_dated_expense(
        conn: &Connection,
        user_id: UserID,
        date: time::Date,
        amount: f64,
        category: &str,
    ) -> Expense {
        create_expense(
            NewExpense {
                user_id,
                date,
                category: category.to_owned(),
                amount,
                description: "Test expense".to_owned(),
            },
            conn,
        )
        .expect("Could not create test expense")
    }

    #[test]
    fn query_filters_by_year_and_month() {
        let (conn, user) = init_db_with_user();
        let in_range =
            create_dated_expense(&conn, user.id, date!(2024 - 06 - 10), 10.0, "Groceries");
        create_dated_expense(&conn, user.id, date!(2024 - 05 - 10), 20.0, "Groceries");
        create_dated_expense(&conn, user.id, date!(2023 - 06 - 10), 30.0, "Groceries");

        let filter = ExpenseFilter {
            user_id: user.id,
            year: Some(2024),
            month: Some(6),
            category: None,
        };

        let got = query_expenses(&filter, 0, 10, &conn).unwrap();

        assert_eq!(got, vec![in_range]);
        assert_eq!(count_expenses(&filter, &conn).unwrap(), 1);
    }

    #[test]
    fn query_does_not_return_other_users_expenses() {
        let (conn, user) = init_db_with_user();
        let other_user =
            create_user("mallory", PasswordHash::new_unchecked("hunter2"), &conn).unwrap();
        create_dated_expense(&conn, other_user.id, date!(2024 - 06 - 10), 10.0, "Groceries");

        let got = query_expenses(&ExpenseFilter::for_user(user.id), 0, 10, &conn).unwrap();

        assert_eq!(got, vec![]);
    }

    #[test]
    fn query_orders_newest_date_first() {
        let (conn, user) = init_db_with_user();
        let oldest = create_dated_expense(&conn, user.id, date!(2024 - 06 - 01), 10.0, "Groceries");
        let newest = create_dated_expense(&conn, user.id, date!(2024 - 06 - 20), 20.0, "Groceries");
        let middle = create_dated_expense(&conn, user.id, date!(2024 - 06 - 10), 30.0, "Groceries");

        let got = query_expenses(&ExpenseFilter::for_user(user.id), 0, 10, &conn).unwrap();

        assert_eq!(got, vec![newest, middle, oldest]);
    }

    #[test]
    fn query_applies_offset_and_limit() {
        let (conn, user) = init_db_with_user();
        for day in 1..=5 {
            create_dated_expense(
                &conn,
                user.id,
                date!(2024 - 06 - 01).replace_day(day).unwrap(),
                10.0,
                "Groceries",
            );
        }

        let got = query_expenses(&ExpenseFilter::for_user(user.id), 2, 2, &conn).unwrap();

        // Newest first: days 5, 4 | 3, 2 | 1.
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].date, date!(2024 - 06 - 03));
        assert_eq!(got[1].date, date!(2024 - 06 - 02));
    }
}
