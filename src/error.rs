/*
 *  Salesboard - Discord bot for weekly sales leaderboards from Google Sheets.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */
use std::path::PathBuf;

/* Sheet access errors: */

/**
 * Failure to open or read the configured worksheet.
 *
 * Any of these makes the sheet unavailable for the current invocation.
 */
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Google API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Could not read the credentials file {}: {source}", .path.display())]
    CredentialsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(String),
    #[error("Could not sign the token request: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Token request rejected: {0}")]
    TokenRejected(String),
    #[error("Spreadsheet '{0}' not found, or not shared with the service account")]
    SpreadsheetNotFound(String),
    #[error("Worksheet '{0}' not found in the spreadsheet")]
    WorksheetNotFound(String),
    #[error("Header row is missing the configured column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("Invalid API endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Unexpected response body: {0}")]
    Json(#[from] serde_json::Error),
}

/* Leaderboard computation errors: */

/**
 * Failures that abort a whole leaderboard computation.
 *
 * Per-row problems are not represented here: they end up in the diagnostics of the leaderboard.
 */
#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("Sheet unavailable: {0}")]
    SourceUnavailable(#[from] SheetError),
    #[error("None of the {skipped} non-blank row(s) could be parsed")]
    NoParsableRows { skipped: usize },
}

impl LeaderboardError {
    /**
     * Short message suitable for replying to the user that triggered the command.
     */
    pub fn user_message(&self) -> &'static str {
        match self {
            LeaderboardError::SourceUnavailable(SheetError::MissingColumns(_)) => {
                "**Error:** The sheet's header row does not match the configured columns. \
                Please contact an administrator."
            }
            LeaderboardError::SourceUnavailable(_) => {
                "**Error:** Could not access the Google Sheet right now. \
                Check the sheet's permissions and try again later."
            }
            LeaderboardError::NoParsableRows { .. } => {
                "**Error:** None of the sheet's rows could be read. \
                Check the date format and the numeric columns."
            }
        }
    }
}

/* Startup configuration errors: */

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read the environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Configuration value {0} is blank")]
    Blank(&'static str),
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Google Sheets credentials file not found at {}", .0.display())]
    CredentialsNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_are_listed() {
        let err = SheetError::MissingColumns(vec!["Dials".into(), "Date".into()]);
        assert_eq!(
            err.to_string(),
            "Header row is missing the configured column(s): Dials, Date"
        );
    }

    #[test]
    fn header_mismatch_gets_its_own_user_message() {
        let err: LeaderboardError = SheetError::MissingColumns(vec!["Name".into()]).into();
        assert!(err.user_message().contains("header row"));

        let err: LeaderboardError = SheetError::WorksheetNotFound("Week".into()).into();
        assert!(err.user_message().contains("Could not access"));
    }
}
