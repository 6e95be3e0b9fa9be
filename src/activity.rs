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
use crate::sheets::RawRow;
use crate::utils::ColumnBindings;
use chrono::{NaiveDate, NaiveDateTime};
use getset::{CopyGetters, Getters};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/**
 * The kinds of sales activity tracked in the sheet.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Dials,
    Doorknocks,
    Appointments,
    Presentations,
}

impl Metric {
    /// All metrics, in display order.
    pub const ALL: [Metric; 4] = [
        Metric::Dials,
        Metric::Doorknocks,
        Metric::Appointments,
        Metric::Presentations,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Dials => "Dials",
            Metric::Doorknocks => "Doorknocks",
            Metric::Appointments => "Appointments",
            Metric::Presentations => "Presentations",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case-insensitive parsing of a metric name ("dials", "Dials", ...).
impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "expected one of {}",
                    Metric::ALL.map(|m| m.label().to_lowercase()).join(", ")
                )
            })
    }
}

/**
 * One parsed spreadsheet row: a salesperson's activity on a given date.
 */
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct ActivityRecord {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    date: NaiveDate,
    #[getset(get_copy = "pub")]
    dials: u32,
    #[getset(get_copy = "pub")]
    doorknocks: u32,
    #[getset(get_copy = "pub")]
    appointments: u32,
    #[getset(get_copy = "pub")]
    presentations: u32,
}

impl ActivityRecord {
    /**
     * Builds a record. The name is stored whitespace-trimmed.
     */
    pub fn new(
        name: &str,
        date: NaiveDate,
        dials: u32,
        doorknocks: u32,
        appointments: u32,
        presentations: u32,
    ) -> ActivityRecord {
        ActivityRecord {
            name: name.trim().to_string(),
            date,
            dials,
            doorknocks,
            appointments,
            presentations,
        }
    }

    pub fn metric(&self, metric: Metric) -> u32 {
        match metric {
            Metric::Dials => self.dials,
            Metric::Doorknocks => self.doorknocks,
            Metric::Appointments => self.appointments,
            Metric::Presentations => self.presentations,
        }
    }
}

/**
 * The field of a row that failed to parse.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Date,
    Metric(Metric),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Date => f.write_str("Date"),
            Field::Metric(metric) => metric.fmt(f),
        }
    }
}

/**
 * A row that could not be turned into an `ActivityRecord`.
 *
 * `row` is the spreadsheet row number (the header being row 1).
 */
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("row {row}: {field} '{value}' {reason}")]
pub struct RowParseError {
    pub row: usize,
    pub field: Field,
    pub value: String,
    pub reason: String,
}

/**
 * Result of parsing a whole sheet: the good records, plus what went wrong with the rest.
 */
#[derive(Debug, Default)]
pub struct ParsedRows {
    pub records: Vec<ActivityRecord>,
    pub diagnostics: Vec<RowParseError>,
    /// Rows without a name, which are ignored silently.
    pub blank: usize,
}

impl ParsedRows {
    /**
     * One-line count of the skipped rows per failing field, e.g.
     * `3 malformed row(s) skipped (Date: 2, Dials: 1)`. `None` when nothing was skipped.
     */
    pub fn problem_summary(&self) -> Option<String> {
        if self.diagnostics.is_empty() {
            return None;
        }

        let mut by_field: BTreeMap<Field, usize> = BTreeMap::new();
        for diagnostic in &self.diagnostics {
            *by_field.entry(diagnostic.field).or_default() += 1;
        }
        let counts = by_field
            .iter()
            .map(|(field, count)| format!("{}: {}", field, count))
            .collect::<Vec<_>>()
            .join(", ");

        Some(format!(
            "{} malformed row(s) skipped ({})",
            self.diagnostics.len(),
            counts
        ))
    }
}

/**
 * Parses one raw row.
 *
 * Returns `Ok(None)` for rows with no name (blank rows, or trailing junk in the sheet).
 */
pub fn parse_row(
    row: &RawRow,
    columns: &ColumnBindings,
    date_format: &str,
) -> Result<Option<ActivityRecord>, RowParseError> {
    let name = row.get(&columns.name).trim();
    if name.is_empty() {
        return Ok(None);
    }

    let date_text = row.get(&columns.date).trim();
    let date = parse_date(date_text, date_format).map_err(|reason| RowParseError {
        row: row.number,
        field: Field::Date,
        value: date_text.to_string(),
        reason,
    })?;

    let mut values = [0u32; 4];
    for (value, metric) in values.iter_mut().zip(Metric::ALL) {
        let text = row.get(columns.metric(metric));
        *value = parse_count(text).map_err(|reason| RowParseError {
            row: row.number,
            field: Field::Metric(metric),
            value: text.trim().to_string(),
            reason,
        })?;
    }
    let [dials, doorknocks, appointments, presentations] = values;

    Ok(Some(ActivityRecord::new(
        name,
        date,
        dials,
        doorknocks,
        appointments,
        presentations,
    )))
}

/**
 * Parses every row, collecting failures instead of stopping at the first one.
 */
pub fn parse_rows(rows: &[RawRow], columns: &ColumnBindings, date_format: &str) -> ParsedRows {
    let mut parsed = ParsedRows::default();

    for row in rows {
        match parse_row(row, columns, date_format) {
            Ok(Some(record)) => parsed.records.push(record),
            Ok(None) => parsed.blank += 1,
            Err(err) => {
                tracing::debug!(row = err.row, field = %err.field, "Skipping row: {}", err);
                parsed.diagnostics.push(err);
            }
        }
    }

    if let Some(summary) = parsed.problem_summary() {
        tracing::warn!("{}", summary);
    }

    parsed
}

/**
 * Parses a date strictly against `format`.
 *
 * Formats that include time fields are accepted too, keeping only the date part.
 */
fn parse_date(text: &str, format: &str) -> Result<NaiveDate, String> {
    if text.is_empty() {
        return Err("is missing".to_string());
    }

    NaiveDate::parse_from_str(text, format)
        .or_else(|err| {
            NaiveDateTime::parse_from_str(text, format)
                .map(|datetime| datetime.date())
                .map_err(|_| err)
        })
        .map_err(|err| format!("does not match the date format '{}' ({})", format, err))
}

// Blank cells count as zero.
fn parse_count(text: &str) -> Result<u32, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }

    text.parse::<u32>()
        .map_err(|_| "is not a non-negative whole number".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn columns() -> ColumnBindings {
        ColumnBindings {
            date: "Date".into(),
            name: "Rep".into(),
            dials: "Dials".into(),
            doorknocks: "Knocks".into(),
            appointments: "Appts".into(),
            presentations: "Pres".into(),
        }
    }

    fn row(number: usize, cells: &[(&str, &str)]) -> RawRow {
        RawRow {
            number,
            cells: cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_a_complete_row() {
        let r = row(
            2,
            &[
                ("Date", "10/20/2025"),
                ("Rep", "  Alice "),
                ("Dials", "12"),
                ("Knocks", "3"),
                ("Appts", "2"),
                ("Pres", "1"),
            ],
        );

        let record = parse_row(&r, &columns(), "%m/%d/%Y").unwrap().unwrap();
        assert_eq!(record.name(), "Alice");
        assert_eq!(record.date(), ymd(2025, 10, 20));
        assert_eq!(record.dials(), 12);
        assert_eq!(record.doorknocks(), 3);
        assert_eq!(record.metric(Metric::Appointments), 2);
        assert_eq!(record.metric(Metric::Presentations), 1);
    }

    #[test]
    fn blank_numeric_cells_are_zero() {
        let r = row(
            3,
            &[
                ("Date", "2025-10-21"),
                ("Rep", "Bob"),
                ("Dials", ""),
                ("Knocks", "   "),
                ("Appts", "4"),
            ],
        );

        let record = parse_row(&r, &columns(), "%Y-%m-%d").unwrap().unwrap();
        assert_eq!(record.dials(), 0);
        assert_eq!(record.doorknocks(), 0);
        assert_eq!(record.appointments(), 4);
        // Column absent from the row altogether.
        assert_eq!(record.presentations(), 0);
    }

    #[test]
    fn rows_without_name_are_skipped() {
        let r = row(4, &[("Date", "not a date"), ("Rep", "  "), ("Dials", "x")]);
        assert_eq!(parse_row(&r, &columns(), "%Y-%m-%d"), Ok(None));
    }

    #[test]
    fn bad_date_reports_row_and_field() {
        let r = row(7, &[("Date", "31/31/2025"), ("Rep", "Carol"), ("Dials", "1")]);

        let err = parse_row(&r, &columns(), "%m/%d/%Y").unwrap_err();
        assert_eq!(err.row, 7);
        assert_eq!(err.field, Field::Date);
        assert_eq!(err.value, "31/31/2025");
    }

    #[test]
    fn missing_date_is_an_error() {
        let r = row(5, &[("Rep", "Carol"), ("Dials", "1")]);

        let err = parse_row(&r, &columns(), "%m/%d/%Y").unwrap_err();
        assert_eq!(err.field, Field::Date);
        assert_eq!(err.reason, "is missing");
    }

    #[test]
    fn negative_or_fractional_counts_are_errors() {
        for bad in ["-2", "1.5", "lots"] {
            let r = row(9, &[("Date", "2025-10-21"), ("Rep", "Dan"), ("Knocks", bad)]);
            let err = parse_row(&r, &columns(), "%Y-%m-%d").unwrap_err();
            assert_eq!(err.field, Field::Metric(Metric::Doorknocks));
            assert_eq!(err.value, bad);
        }
    }

    #[test]
    fn date_formats_with_time_keep_the_date() {
        let r = row(2, &[("Date", "2025-10-21 14:30:00"), ("Rep", "Eve")]);

        let record = parse_row(&r, &columns(), "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .unwrap();
        assert_eq!(record.date(), ymd(2025, 10, 21));
    }

    #[test]
    fn one_bad_row_does_not_hide_the_others() {
        let rows = vec![
            row(2, &[("Date", "2025-10-20"), ("Rep", "A"), ("Dials", "5")]),
            row(3, &[("Date", "yesterday"), ("Rep", "B"), ("Dials", "8")]),
            row(4, &[]),
            row(5, &[("Date", "2025-10-22"), ("Rep", "A"), ("Dials", "3")]),
        ];

        let parsed = parse_rows(&rows, &columns(), "%Y-%m-%d");
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.blank, 1);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].row, 3);
        assert!(parsed.records.iter().all(|r| r.name() == "A"));
    }

    #[test]
    fn metric_names_parse_case_insensitively() {
        assert_eq!("dials".parse::<Metric>(), Ok(Metric::Dials));
        assert_eq!(" Presentations ".parse::<Metric>(), Ok(Metric::Presentations));
        assert!("calls".parse::<Metric>().is_err());
    }

    #[test]
    fn skipped_rows_are_summarized_per_field() {
        let rows = vec![
            row(2, &[("Date", "soon"), ("Rep", "A")]),
            row(3, &[("Date", "2025-10-20"), ("Rep", "B"), ("Dials", "x")]),
            row(4, &[("Date", "later"), ("Rep", "C")]),
            row(5, &[("Date", "2025-10-20"), ("Rep", "D"), ("Dials", "4")]),
        ];

        let parsed = parse_rows(&rows, &columns(), "%Y-%m-%d");
        assert_eq!(
            parsed.problem_summary().as_deref(),
            Some("3 malformed row(s) skipped (Date: 2, Dials: 1)")
        );

        let clean = parse_rows(&rows[3..], &columns(), "%Y-%m-%d");
        assert_eq!(clean.problem_summary(), None);
    }
}
