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
use crate::activity::Metric;
use crate::error::ConfigError;
use crate::sheets::RetryPolicy;
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use serenity::all::GuildId;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVES: &str = "info,serenity=warn";

const MAX_TOP_N: usize = 25;

/* Data structures: */

/**
 * The environment, as read by envy. Every field maps to the upper-cased environment variable.
 */
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Deserialize)]
pub struct RawConfig {
    pub discord_bot_token: String,
    pub google_sheets_credentials_file: String,
    pub google_sheet_name: String,
    pub worksheet_name: String,
    pub date_column_name: String,
    pub name_column_name: String,
    pub dials_column_name: String,
    pub doorknocks_column_name: String,
    pub appointments_column_name: String,
    pub presentations_column_name: String,
    pub sheet_date_format: String,
    pub week_start: Option<String>,
    pub primary_metric: Option<String>,
    pub secondary_metric: Option<String>,
    pub leaderboard_top_n: Option<usize>,
    pub leaderboard_timezone: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub fetch_retries: Option<u32>,
    pub command_prefix: Option<String>,
    pub guild_id: Option<u64>,
}

/**
 * Header names of the worksheet columns the bot reads.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnBindings {
    pub date: String,
    pub name: String,
    pub dials: String,
    pub doorknocks: String,
    pub appointments: String,
    pub presentations: String,
}

impl ColumnBindings {
    pub fn metric(&self, metric: Metric) -> &str {
        match metric {
            Metric::Dials => &self.dials,
            Metric::Doorknocks => &self.doorknocks,
            Metric::Appointments => &self.appointments,
            Metric::Presentations => &self.presentations,
        }
    }

    pub fn all(&self) -> [&str; 6] {
        [
            &self.date,
            &self.name,
            &self.dials,
            &self.doorknocks,
            &self.appointments,
            &self.presentations,
        ]
    }
}

/**
 * Where the activity data lives, and how to read it.
 */
#[derive(Clone, Debug)]
pub struct SheetConfig {
    /// Path to the service account's JSON key.
    pub credentials_file: PathBuf,
    /// Spreadsheet name, ID or URL.
    pub spreadsheet: String,
    pub worksheet: String,
    pub columns: ColumnBindings,
    /// strftime-style format of the date column.
    pub date_format: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/**
 * How leaderboards are computed and shown.
 */
#[derive(Clone, Debug)]
pub struct BoardConfig {
    pub week_start: Weekday,
    /// Ranking metric when the command does not ask for a specific one.
    pub primary: Metric,
    /// First tie-break. Remaining ties are broken by name.
    pub secondary: Metric,
    pub top_n: usize,
    /// Time zone used to decide what "today" is. Host local time if unset.
    pub timezone: Option<Tz>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            week_start: Weekday::Mon,
            primary: Metric::Dials,
            secondary: Metric::Doorknocks,
            top_n: 9,
            timezone: None,
        }
    }
}

impl BoardConfig {
    pub fn today(&self) -> NaiveDate {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => Local::now().date_naive(),
        }
    }
}

/**
 * Validated bot configuration.
 */
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub discord_token: String,
    /// Register the commands in this guild only, instead of globally.
    pub guild_id: Option<GuildId>,
    /// Enables prefix commands (e.g. `!leaderboard`) besides slash commands.
    pub command_prefix: Option<String>,
    pub sheet: SheetConfig,
    pub board: BoardConfig,
}

impl BotConfig {
    /**
     * Loads the configuration from the environment (and a `.env` file, if present).
     */
    pub fn from_env() -> Result<BotConfig, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!("Could not load the .env file: {}", err);
            }
        }

        BotConfig::from_raw(envy::from_env::<RawConfig>()?)
    }

    /**
     * Validates the raw environment values into a `BotConfig`.
     */
    pub fn from_raw(raw: RawConfig) -> Result<BotConfig, ConfigError> {
        let credentials_file = PathBuf::from(required(
            "GOOGLE_SHEETS_CREDENTIALS_FILE",
            raw.google_sheets_credentials_file,
        )?);
        if !credentials_file.is_file() {
            return Err(ConfigError::CredentialsNotFound(credentials_file));
        }

        let columns = ColumnBindings {
            date: required("DATE_COLUMN_NAME", raw.date_column_name)?,
            name: required("NAME_COLUMN_NAME", raw.name_column_name)?,
            dials: required("DIALS_COLUMN_NAME", raw.dials_column_name)?,
            doorknocks: required("DOORKNOCKS_COLUMN_NAME", raw.doorknocks_column_name)?,
            appointments: required("APPOINTMENTS_COLUMN_NAME", raw.appointments_column_name)?,
            presentations: required("PRESENTATIONS_COLUMN_NAME", raw.presentations_column_name)?,
        };

        let date_format = required("SHEET_DATE_FORMAT", raw.sheet_date_format)?;
        if StrftimeItems::new(&date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid {
                key: "SHEET_DATE_FORMAT",
                value: date_format,
                reason: "not a valid strftime format".to_string(),
            });
        }

        let timeout_secs = raw.fetch_timeout_secs.unwrap_or(10);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let defaults = BoardConfig::default();
        let board = BoardConfig {
            week_start: parse_optional("WEEK_START", raw.week_start, defaults.week_start)?,
            primary: parse_optional("PRIMARY_METRIC", raw.primary_metric, defaults.primary)?,
            secondary: parse_optional("SECONDARY_METRIC", raw.secondary_metric, defaults.secondary)?,
            top_n: match raw.leaderboard_top_n {
                None => defaults.top_n,
                Some(n) if (1..=MAX_TOP_N).contains(&n) => n,
                Some(n) => {
                    return Err(ConfigError::Invalid {
                        key: "LEADERBOARD_TOP_N",
                        value: n.to_string(),
                        reason: format!("must be between 1 and {}", MAX_TOP_N),
                    })
                }
            },
            timezone: match raw.leaderboard_timezone.filter(|tz| !tz.trim().is_empty()) {
                None => None,
                Some(tz) => Some(tz.trim().parse::<Tz>().map_err(|err| ConfigError::Invalid {
                    key: "LEADERBOARD_TIMEZONE",
                    value: tz.clone(),
                    reason: err.to_string(),
                })?),
            },
        };

        let guild_id = match raw.guild_id {
            None => None,
            Some(0) => {
                return Err(ConfigError::Invalid {
                    key: "GUILD_ID",
                    value: "0".to_string(),
                    reason: "not a valid guild ID".to_string(),
                })
            }
            Some(id) => Some(GuildId::new(id)),
        };

        Ok(BotConfig {
            discord_token: required("DISCORD_BOT_TOKEN", raw.discord_bot_token)?,
            guild_id,
            command_prefix: raw
                .command_prefix
                .map(|prefix| prefix.trim().to_string())
                .filter(|prefix| !prefix.is_empty()),
            sheet: SheetConfig {
                credentials_file,
                spreadsheet: required("GOOGLE_SHEET_NAME", raw.google_sheet_name)?,
                worksheet: required("WORKSHEET_NAME", raw.worksheet_name)?,
                columns,
                date_format,
                timeout: Duration::from_secs(timeout_secs),
                retry: RetryPolicy {
                    retries: raw.fetch_retries.unwrap_or(2).min(5),
                    ..RetryPolicy::default()
                },
            },
            board,
        })
    }
}

fn required(key: &'static str, value: String) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Blank(key));
    }

    Ok(value.to_string())
}

fn parse_optional<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(text) => text.parse::<T>().map_err(|err| ConfigError::Invalid {
            key,
            value: text.to_string(),
            reason: err.to_string(),
        }),
    }
}

/**
 * Installs the global tracing subscriber. `RUST_LOG` overrides the default filter.
 */
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/**
 * Macro for logging the usage of a command.
 */
macro_rules! log_cmd_usage {
    ($ctx:ident) => {
        tracing::info!(
            user_id = %$ctx.author().id,
            "Executing command `{}`, triggered by {}.",
            $ctx.invocation_string(),
            $ctx.author().tag()
        );
    };
}
pub(crate) use log_cmd_usage;

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(credentials: &tempfile::NamedTempFile, extra: &[(&str, &str)]) -> RawConfig {
        let mut vars = vec![
            ("DISCORD_BOT_TOKEN", "token"),
            ("GOOGLE_SHEETS_CREDENTIALS_FILE", credentials.path().to_str().unwrap()),
            ("GOOGLE_SHEET_NAME", "Sales Tracker"),
            ("WORKSHEET_NAME", "Activity"),
            ("DATE_COLUMN_NAME", "Date"),
            ("NAME_COLUMN_NAME", " Rep "),
            ("DIALS_COLUMN_NAME", "Dials"),
            ("DOORKNOCKS_COLUMN_NAME", "Doorknocks"),
            ("APPOINTMENTS_COLUMN_NAME", "Appointments"),
            ("PRESENTATIONS_COLUMN_NAME", "Presentations"),
            ("SHEET_DATE_FORMAT", "%m/%d/%Y"),
        ];
        vars.extend_from_slice(extra);

        envy::from_iter(
            vars.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        let config = BotConfig::from_raw(raw(&credentials, &[])).unwrap();

        assert_eq!(config.sheet.columns.name, "Rep");
        assert_eq!(config.sheet.timeout, Duration::from_secs(10));
        assert_eq!(config.sheet.retry.retries, 2);
        assert_eq!(config.board.week_start, Weekday::Mon);
        assert_eq!(config.board.primary, Metric::Dials);
        assert_eq!(config.board.secondary, Metric::Doorknocks);
        assert_eq!(config.board.top_n, 9);
        assert!(config.board.timezone.is_none());
        assert!(config.command_prefix.is_none());
        assert!(config.guild_id.is_none());
    }

    #[test]
    fn optional_settings_are_parsed() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        let config = BotConfig::from_raw(raw(
            &credentials,
            &[
                ("WEEK_START", "sunday"),
                ("PRIMARY_METRIC", "Appointments"),
                ("SECONDARY_METRIC", "presentations"),
                ("LEADERBOARD_TOP_N", "5"),
                ("LEADERBOARD_TIMEZONE", "America/Chicago"),
                ("COMMAND_PREFIX", "!"),
                ("GUILD_ID", "794733579770920990"),
            ],
        ))
        .unwrap();

        assert_eq!(config.board.week_start, Weekday::Sun);
        assert_eq!(config.board.primary, Metric::Appointments);
        assert_eq!(config.board.secondary, Metric::Presentations);
        assert_eq!(config.board.top_n, 5);
        assert_eq!(config.board.timezone, Some(chrono_tz::America::Chicago));
        assert_eq!(config.command_prefix.as_deref(), Some("!"));
        assert_eq!(config.guild_id, Some(GuildId::new(794733579770920990)));
    }

    #[test]
    fn missing_binding_fails_at_startup() {
        let vars = vec![("DISCORD_BOT_TOKEN".to_string(), "token".to_string())];
        assert!(envy::from_iter::<_, RawConfig>(vars).is_err());
    }

    #[test]
    fn blank_binding_fails_at_startup() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        let err = BotConfig::from_raw(raw(&credentials, &[("DIALS_COLUMN_NAME", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Blank("DIALS_COLUMN_NAME")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        for (key, value) in [
            ("WEEK_START", "someday"),
            ("PRIMARY_METRIC", "calls"),
            ("LEADERBOARD_TOP_N", "0"),
            ("LEADERBOARD_TIMEZONE", "Mars/Olympus"),
            ("SHEET_DATE_FORMAT", "%m/%d/%"),
            ("FETCH_TIMEOUT_SECS", "0"),
        ] {
            let err = BotConfig::from_raw(raw(&credentials, &[(key, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: k, .. } if k == key),
                "{key}={value} gave {err}"
            );
        }
    }

    #[test]
    fn credentials_file_must_exist() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        let mut config = raw(&credentials, &[]);
        config.google_sheets_credentials_file = "/nonexistent/credentials.json".to_string();

        assert!(matches!(
            BotConfig::from_raw(config),
            Err(ConfigError::CredentialsNotFound(_))
        ));
    }

    #[test]
    fn column_bindings_by_metric() {
        let credentials = tempfile::NamedTempFile::new().unwrap();
        let config = BotConfig::from_raw(raw(&credentials, &[])).unwrap();
        let columns = &config.sheet.columns;

        assert_eq!(columns.metric(Metric::Doorknocks), "Doorknocks");
        assert_eq!(
            columns.all(),
            ["Date", "Rep", "Dials", "Doorknocks", "Appointments", "Presentations"]
        );
    }
}
