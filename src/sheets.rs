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
/*
 * Read-only Google Sheets access through a service account.
 *
 * Talks to the Sheets v4 and Drive v3 REST APIs directly with reqwest. Authentication follows
 * the service-account flow: a JWT assertion signed with the account's private key is exchanged
 * for a short-lived access token, which is cached until shortly before it expires.
 */

use crate::error::SheetError;
use crate::utils::{ColumnBindings, SheetConfig};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use regex::Regex;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex;

/// OAuth2 scopes requested for the service account.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

// Tokens this close to their expiry are refreshed beforehand.
const TOKEN_EXPIRY_MARGIN: TimeDelta = TimeDelta::seconds(60);

static SPREADSHEET_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").expect("Invalid spreadsheet URL regex.")
});
static SPREADSHEET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{40,}$").expect("Invalid spreadsheet ID regex."));

/* Data structures: */

/**
 * One data row of the worksheet, as a mapping from header name to cell text.
 */
#[derive(Clone, Debug, Default)]
pub struct RawRow {
    /// Spreadsheet row number (the header is row 1).
    pub number: usize,
    pub cells: HashMap<String, String>,
}

impl RawRow {
    /**
     * Text of the cell under `column`, or "" if the row has no such cell.
     */
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

/**
 * Base URLs of the Google APIs. Only overridden in tests.
 */
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub sheets: String,
    pub drive: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            sheets: String::from("https://sheets.googleapis.com"),
            drive: String::from("https://www.googleapis.com"),
        }
    }
}

/**
 * Bounded retry of transient failures (timeouts, connection errors, 408, 429 and 5xx).
 */
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// The relevant part of a service account's JSON key.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/**
 * Long-lived, read-only handle on one worksheet.
 *
 * Opened once at startup and shared between command invocations. Row data is never cached: every
 * call to `fetch_rows` reads the sheet again.
 */
pub struct SheetClient {
    http: reqwest::Client,
    client_email: String,
    token_uri: String,
    signing_key: EncodingKey,
    endpoints: Endpoints,
    retry: RetryPolicy,
    spreadsheet_id: String,
    worksheet: String,
    columns: ColumnBindings,
    token: Mutex<Option<CachedToken>>,
}

impl SheetClient {
    /**
     * Loads the service account, resolves the spreadsheet and checks that the worksheet exists.
     */
    pub async fn open(config: &SheetConfig, endpoints: Endpoints) -> Result<SheetClient, SheetError> {
        let json = std::fs::read_to_string(&config.credentials_file).map_err(|source| {
            SheetError::CredentialsFile {
                path: config.credentials_file.clone(),
                source,
            }
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&json)
            .map_err(|err| SheetError::InvalidCredentials(err.to_string()))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let mut client = SheetClient {
            http,
            client_email: key.client_email,
            token_uri: key.token_uri,
            signing_key,
            endpoints,
            retry: config.retry.clone(),
            spreadsheet_id: String::new(),
            worksheet: config.worksheet.clone(),
            columns: config.columns.clone(),
            token: Mutex::new(None),
        };

        match spreadsheet_id_from(&config.spreadsheet) {
            Some(id) => {
                client.spreadsheet_id = id;
                match client.check_worksheet(&config.spreadsheet).await {
                    // A bare value that only looks like an ID may still be a spreadsheet title.
                    Err(SheetError::SpreadsheetNotFound(_))
                        if !SPREADSHEET_URL.is_match(&config.spreadsheet) =>
                    {
                        tracing::debug!(
                            spreadsheet = %config.spreadsheet,
                            "No spreadsheet with this ID; looking it up by name."
                        );
                        client.spreadsheet_id = client.find_spreadsheet(&config.spreadsheet).await?;
                        client.check_worksheet(&config.spreadsheet).await?;
                    }
                    other => other?,
                }
            }
            None => {
                client.spreadsheet_id = client.find_spreadsheet(&config.spreadsheet).await?;
                client.check_worksheet(&config.spreadsheet).await?;
            }
        }

        tracing::info!(
            spreadsheet = %config.spreadsheet,
            worksheet = %client.worksheet,
            "Connected to Google Sheet."
        );

        Ok(client)
    }

    /**
     * Reads every data row of the worksheet.
     */
    pub async fn fetch_rows(&self) -> Result<Vec<RawRow>, SheetError> {
        let range = quote_sheet_name(&self.worksheet);
        let url = endpoint_url(
            &self.endpoints.sheets,
            &["v4", "spreadsheets", &self.spreadsheet_id, "values", &range],
        )?;
        let request = self.http.get(url).query(&[
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "UNFORMATTED_VALUE"),
            ("dateTimeRenderOption", "FORMATTED_STRING"),
        ]);

        let range: ValueRange = self.get_json(request).await?;
        let rows = rows_from_values(range.values, &self.columns)?;
        tracing::debug!(rows = rows.len(), "Fetched worksheet rows.");

        Ok(rows)
    }

    /**
     * Drops the cached access token. The client must not be used afterwards.
     */
    pub async fn close(&self) {
        self.token.lock().await.take();
        tracing::info!(worksheet = %self.worksheet, "Closed the Google Sheets client.");
    }

    /* Spreadsheet resolution: */

    async fn find_spreadsheet(&self, name: &str) -> Result<String, SheetError> {
        let url = endpoint_url(&self.endpoints.drive, &["drive", "v3", "files"])?;
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let request = self.http.get(url).query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("pageSize", "10"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let list: FileList = self.get_json(request).await?;
        let mut files = list.files.into_iter();
        let Some(file) = files.next() else {
            return Err(SheetError::SpreadsheetNotFound(name.to_string()));
        };
        if files.next().is_some() {
            tracing::warn!(
                spreadsheet = %name,
                id = %file.id,
                "Several spreadsheets share this name; using the first one."
            );
        }
        tracing::debug!(name = %file.name, id = %file.id, "Resolved spreadsheet by name.");

        Ok(file.id)
    }

    async fn check_worksheet(&self, spreadsheet: &str) -> Result<(), SheetError> {
        let url = endpoint_url(
            &self.endpoints.sheets,
            &["v4", "spreadsheets", &self.spreadsheet_id],
        )?;
        let request = self
            .http
            .get(url)
            .query(&[("fields", "sheets.properties.title")]);

        let meta: SpreadsheetMeta = match self.get_json(request).await {
            Err(SheetError::Api { status: 404, .. }) => {
                return Err(SheetError::SpreadsheetNotFound(spreadsheet.to_string()))
            }
            other => other?,
        };

        if meta
            .sheets
            .iter()
            .any(|sheet| sheet.properties.title == self.worksheet)
        {
            Ok(())
        } else {
            Err(SheetError::WorksheetNotFound(self.worksheet.clone()))
        }
    }

    /* Authentication: */

    async fn access_token(&self) -> Result<String, SheetError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);

        Ok(value)
    }

    async fn request_token(&self) -> Result<CachedToken, SheetError> {
        let now = Utc::now();
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPES.join(" "),
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: (now + TimeDelta::hours(1)).timestamp(),
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;

        let request = self.http.post(&self.token_uri).form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ]);
        let response = send_with_retry(request, &self.retry).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SheetError::TokenRejected(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        tracing::debug!("Obtained a new Google access token.");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + TimeDelta::seconds(token.expires_in.unwrap_or(3600)),
        })
    }

    /**
     * Sends an authorized GET request and decodes its JSON body.
     */
    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetError> {
        let token = self.access_token().await?;
        let response = send_with_retry(request.bearer_auth(token), &self.retry).await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
        }
        if !status.is_success() {
            return Err(SheetError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/* HTTP helpers: */

fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, SheetError> {
    let invalid = || SheetError::InvalidEndpoint(base.to_string());
    let mut url = Url::parse(base).map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(attempt: u32, policy: &RetryPolicy, retry_after: Option<&str>) -> Duration {
    if let Some(secs) = retry_after.and_then(|value| value.trim().parse::<u64>().ok()) {
        return Duration::from_secs(secs.min(30));
    }

    policy
        .initial_backoff
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_backoff)
}

/**
 * Sends a request, retrying transient failures up to `policy.retries` extra times.
 */
async fn send_with_retry(request: RequestBuilder, policy: &RetryPolicy) -> Result<Response, SheetError> {
    let mut attempt = 0;
    loop {
        let Some(cloned) = request.try_clone() else {
            return Ok(request.send().await?);
        };

        match cloned.send().await {
            Ok(response) if is_retryable_status(response.status()) && attempt < policy.retries => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|value| value.to_str().ok());
                let delay = retry_delay(attempt, policy, retry_after);
                tracing::warn!(
                    "Google API retry {}/{} after status {} (sleep {:?}).",
                    attempt + 1,
                    policy.retries,
                    response.status(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(err) if (err.is_timeout() || err.is_connect()) && attempt < policy.retries => {
                let delay = retry_delay(attempt, policy, None);
                tracing::warn!(
                    "Google API retry {}/{} after transport error: {} (sleep {:?}).",
                    attempt + 1,
                    policy.retries,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }

        attempt += 1;
    }
}

/**
 * Extracts `error.message` from a Google API error body, falling back to the raw body.
 */
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/* Sheet data helpers: */

/**
 * Gets the spreadsheet ID out of a Sheets URL or a bare ID. Returns `None` for anything that looks
 * like a spreadsheet name instead.
 */
pub fn spreadsheet_id_from(spreadsheet: &str) -> Option<String> {
    let spreadsheet = spreadsheet.trim();
    if let Some(captures) = SPREADSHEET_URL.captures(spreadsheet) {
        return Some(captures[1].to_string());
    }

    SPREADSHEET_ID
        .is_match(spreadsheet)
        .then(|| spreadsheet.to_string())
}

/// A1-notation range covering a whole worksheet.
fn quote_sheet_name(worksheet: &str) -> String {
    format!("'{}'", worksheet.replace('\'', "''"))
}

/**
 * Text of a cell as returned with unformatted values. Integral numbers lose their ".0".
 */
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(true) => String::from("TRUE"),
        Value::Bool(false) => String::from("FALSE"),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.to_string()
            } else if let Some(float) = number.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15) {
                format!("{}", float as i64)
            } else {
                number.to_string()
            }
        }
        other => other.to_string(),
    }
}

/**
 * Turns the worksheet values into rows keyed by header name.
 *
 * The first row is the header, and must contain every configured column. Rows shorter than the
 * header are padded with empty cells.
 */
pub fn rows_from_values(
    values: Vec<Vec<Value>>,
    columns: &ColumnBindings,
) -> Result<Vec<RawRow>, SheetError> {
    let mut values = values.into_iter();
    let Some(header) = values.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.iter().map(|v| cell_text(v).trim().to_string()).collect();

    let missing: Vec<String> = columns
        .all()
        .into_iter()
        .filter(|column| !header.iter().any(|h| h == column))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(SheetError::MissingColumns(missing));
    }

    let rows = values
        .enumerate()
        .map(|(i, row)| {
            let mut cells = HashMap::with_capacity(header.len());
            for (j, name) in header.iter().enumerate() {
                if name.is_empty() {
                    continue;
                }
                // Duplicate headers: the leftmost column wins.
                cells
                    .entry(name.clone())
                    .or_insert_with(|| row.get(j).map(cell_text).unwrap_or_default());
            }
            RawRow {
                number: i + 2,
                cells,
            }
        })
        .collect();

    Ok(rows)
}

/* Shared test fixtures: a mocked Google backend. */
