//! Code for creating the user table and fetching users from the database.

use std::fmt::Display;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, PasswordHash};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user's ID in the application database.
    pub id: UserID,
    /// The name the user logs in with.
    pub username: String,
    /// The user's password hash.
    pub password_hash: PasswordHash,
    /// When the user registered.
    pub created_at: OffsetDateTime,
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// Returns [Error::UsernameTaken] if `username` already belongs to another
/// user, or [Error::SqlError] if an SQL related error occurred.
pub fn create_user(
    username: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let created_at = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO user (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
        (username, password_hash.as_str(), created_at),
    )?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        username: username.to_owned(),
        password_hash,
        created_at,
    })
}

/// Get the user from the database with an ID equal to `user_id`.
///
/// # Errors
///
/// This function will return an error if:
/// - `user_id` does not belong to a registered user.
/// - there was an error trying to access the database.
pub fn get_user_by_id(user_id: UserID, db_connection: &Connection) -> Result<User, Error> {
    db_connection
        .prepare("SELECT id, username, password_hash, created_at FROM user WHERE id = :id")?
        .query_row(&[(":id", &user_id.as_i64())], map_user_row)
        .map_err(|error| error.into())
}

/// Get the user from the database whose username is `username`.
///
/// # Errors
///
/// This function will return [Error::NotFound] if no user has `username`, or
/// [Error::SqlError] if there was an error trying to access the database.
pub fn get_user_by_username(username: &str, db_connection: &Connection) -> Result<User, Error> {
    db_connection
        .prepare("SELECT id, username, password_hash, created_at FROM user WHERE username = :username")?
        .query_row(&[(":username", username)], map_user_row)
        .map_err(|error| error.into())
}

fn map_user_row(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let raw_id = row.get(0)?;
    let username: String = row.get(1)?;
    let raw_password_hash: String = row.get(2)?;
    let created_at: OffsetDateTime = row.get(3)?;

    Ok(User {
        id: UserID::new(raw_id),
        username,
        password_hash: PasswordHash::new_unchecked(&raw_password_hash),
        created_at,
    })
}

#[cfg(test)]
mod user_tests {
    use rusqlite::Connection;

    use crate::{
        PasswordHash,
        user::{UserID, create_user, get_user_by_id, get_user_by_username},
    };

    use super::{Error, create_user_table};

    fn get_db_connection() -> Connection {
        let conn =
            Connection::open_in_memory().expect("Could not create in-memory SQLite database");
        create_user_table(&conn).expect("Could not create user table");

        conn
    }

    #[test]
    fn insert_user_succeeds() {
        let db_connection = get_db_connection();
        let password_hash = PasswordHash::new_unchecked("hunter2");

        let inserted_user = create_user("alice", password_hash.clone(), &db_connection).unwrap();

        assert!(inserted_user.id.as_i64() > 0);
        assert_eq!(inserted_user.username, "alice");
        assert_eq!(inserted_user.password_hash, password_hash);
    }

    #[test]
    fn insert_user_fails_with_duplicate_username() {
        let db_connection = get_db_connection();
        let password_hash = PasswordHash::new_unchecked("hunter2");
        create_user("alice", password_hash.clone(), &db_connection).unwrap();

        let result = create_user("alice", password_hash, &db_connection);

        assert_eq!(result, Err(Error::UsernameTaken));
    }

    #[test]
    fn get_user_fails_with_non_existent_id() {
        let db_connection = get_db_connection();

        let id = UserID::new(42);

        assert_eq!(get_user_by_id(id, &db_connection), Err(Error::NotFound));
    }

    #[test]
    fn get_user_succeeds_with_existing_id() {
        let db_connection = get_db_connection();
        let test_user =
            create_user("alice", PasswordHash::new_unchecked("hunter2"), &db_connection).unwrap();

        let retrieved_user = get_user_by_id(test_user.id, &db_connection).unwrap();

        assert_eq!(retrieved_user.id, test_user.id);
        assert_eq!(retrieved_user.username, test_user.username);
        assert_eq!(retrieved_user.password_hash, test_user.password_hash);
    }

    #[test]
    fn get_user_by_username_finds_user() {
        let db_connection = get_db_connection();
        let test_user =
            create_user("bob", PasswordHash::new_unchecked("hunter2"), &db_connection).unwrap();

        let retrieved_user = get_user_by_username("bob", &db_connection).unwrap();

        assert_eq!(retrieved_user.id, test_user.id);
        assert_eq!(retrieved_user.username, test_user.username);
    }

    #[test]
    fn get_user_by_username_fails_for_unknown_name() {
        let db_connection = get_db_connection();

        assert_eq!(
            get_user_by_username("nobody", &db_connection),
            Err(Error::NotFound)
        );
    }
}
