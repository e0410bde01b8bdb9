/*! Database initialization for the application. */

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{Error, expense::create_expense_table, user::create_user_table};

/// Create the application tables if they do not exist yet.
///
/// The tables are created inside a single exclusive transaction so that a
/// partially created schema is never visible to another connection.
///
/// # Errors
/// Returns an [Error::SqlError] if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_expense_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
