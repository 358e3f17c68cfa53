//! Account-list credential checks.
//!
//! Accounts live in a single configuration string, `poulda.accounts`,
//! holding whitespace-separated `user:pass` tokens. No hashing: the
//! account list is operator-written configuration, not a user database.

use tracing::debug;

use crate::config::{ACCOUNTS_KEY, Settings};

/// A single `user:pass` account token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Parse the configured account list, preserving token order.
///
/// Tokens without a `:` cannot match any presented credential and are
/// skipped outright.
pub fn parse_accounts(settings: &Settings) -> Vec<Account> {
    settings
        .get(ACCOUNTS_KEY)
        .unwrap_or_default()
        .split_whitespace()
        .filter_map(|token| {
            token.split_once(':').map(|(username, password)| Account {
                username: username.to_owned(),
                password: password.to_owned(),
            })
        })
        .collect()
}

/// Check a username/password pair against the configured account list.
///
/// Comparison is exact and case-sensitive. With no accounts configured,
/// nobody authenticates. Every token is visited and compared in constant
/// time whether or not an earlier one already matched, so response
/// timing says nothing about which username or prefix was close.
pub fn check_password(settings: &Settings, username: &str, password: &str) -> bool {
    let accounts = parse_accounts(settings);
    if accounts.is_empty() {
        debug!("no accounts configured, refusing authentication");
        return false;
    }

    let mut authenticated = false;
    for account in &accounts {
        let matched = constant_time_eq(account.username.as_bytes(), username.as_bytes())
            & constant_time_eq(account.password.as_bytes(), password.as_bytes());
        authenticated |= matched;
    }
    authenticated
}

/// Byte equality without data-dependent early exit.
///
/// Length mismatch is decided up front; content bytes never short-circuit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}
