use csv::{ReaderBuilder, Writer};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("please enter a username and password")]
    EmptyCredentials,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("username already exists, choose another")]
    UsernameTaken,

    #[error("username not found, please sign up")]
    UnknownUser,

    #[error("incorrect password")]
    InvalidPassword,

    #[error("account store unavailable: {0}")]
    Store(String),
}

impl From<io::Error> for AuthError {
    fn from(e: io::Error) -> Self {
        AuthError::Store(e.to_string())
    }
}

impl From<csv::Error> for AuthError {
    fn from(e: csv::Error) -> Self {
        AuthError::Store(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRow {
    username: String,
    password: String,
}

/// Signed-in user, passed explicitly to the handlers that require login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
}

pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<UserRow>, AuthError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn save(&self, rows: &[UserRow]) -> Result<(), AuthError> {
        let mut writer = Writer::from_path(&self.path)?;
        // serialize() only emits a header once a row exists
        writer.write_record(["username", "password"])?;
        for row in rows {
            writer.write_record([row.username.as_str(), row.password.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn create(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::EmptyCredentials);
        }

        // Re-read right before writing; last write wins
        let mut rows = self.load()?;
        if rows.iter().any(|row| row.username == username) {
            return Err(AuthError::UsernameTaken);
        }

        rows.push(UserRow {
            username: username.to_string(),
            password: hash_password(password),
        });
        self.save(&rows)?;

        tracing::info!(username, "account created");
        Ok(())
    }

    pub fn signup(&self, username: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
        if password != confirm {
            return Err(AuthError::PasswordMismatch);
        }
        self.create(username, password)
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = username.trim();
        let rows = self.load()?;
        let row = rows
            .iter()
            .find(|row| row.username == username)
            .ok_or(AuthError::UnknownUser)?;

        if !check_password(password, &row.password) {
            tracing::warn!(username, "login rejected");
            return Err(AuthError::InvalidPassword);
        }

        tracing::info!(username, "login accepted");
        Ok(Session {
            username: username.to_string(),
        })
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// `<salt-hex>$<sha256(salt || password)-hex>`
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub fn check_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt_hex, expected)) => match hex::decode(salt_hex).ok() {
            Some(salt) => digest(&salt, password) == expected,
            None => false,
        },
        // Unsalted digests written by older account files
        None => digest(&[], password) == stored,
    }
}
