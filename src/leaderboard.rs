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
use crate::activity::{self, Metric, RowParseError};
use crate::error::LeaderboardError;
use crate::sheets::RawRow;
use crate::utils::{BoardConfig, SheetConfig};
use crate::week::{self, MetricTotals, WeekWindow};
use chrono::NaiveDate;
use getset::Getters;
use std::collections::BTreeMap;
use std::fmt::Write as _;

// Skipped rows listed individually in the footer.
const LISTED_DIAGNOSTICS: usize = 5;
/// Discord's limit for an embed description, in characters.
pub const DESCRIPTION_LIMIT: usize = 4096;
// Room kept free for the "…and N more." line and the skipped-rows note.
const FOOTER_RESERVE: usize = 256;
const MAX_NAME_CHARS: usize = 64;

/**
 * One salesperson's summed metrics for the week.
 */
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
pub struct LeaderboardEntry {
    #[getset(get = "pub")]
    name: String,
    #[getset(get = "pub")]
    totals: MetricTotals,
}

/**
 * The result of one leaderboard computation.
 */
#[derive(Debug)]
pub struct Leaderboard {
    pub window: WeekWindow,
    pub primary: Metric,
    /// Sorted, best first.
    pub entries: Vec<LeaderboardEntry>,
    pub diagnostics: Vec<RowParseError>,
}

/**
 * Orders the aggregated totals: `primary` descending, then `secondary` descending, then name.
 */
pub fn rank(
    totals: BTreeMap<String, MetricTotals>,
    primary: Metric,
    secondary: Metric,
) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = totals
        .into_iter()
        .map(|(name, totals)| LeaderboardEntry { name, totals })
        .collect();

    entries.sort_by(|a, b| {
        b.totals
            .get(primary)
            .cmp(&a.totals.get(primary))
            .then_with(|| b.totals.get(secondary).cmp(&a.totals.get(secondary)))
            .then_with(|| a.name.cmp(&b.name))
    });

    entries
}

/**
 * Runs the whole computation over freshly fetched rows: parse, filter to the week of `today`,
 * aggregate and rank by `primary`.
 *
 * Fails only if there were rows but none of them could be parsed.
 */
pub fn compile(
    rows: &[RawRow],
    sheet: &SheetConfig,
    board: &BoardConfig,
    primary: Metric,
    today: NaiveDate,
) -> Result<Leaderboard, LeaderboardError> {
    let parsed = activity::parse_rows(rows, &sheet.columns, &sheet.date_format);
    if parsed.records.is_empty() && !parsed.diagnostics.is_empty() {
        return Err(LeaderboardError::NoParsableRows {
            skipped: parsed.diagnostics.len(),
        });
    }

    let window = WeekWindow::containing(today, board.week_start);
    let totals = week::aggregate(&parsed.records, &window);
    let entries = rank(totals, primary, board.secondary);

    tracing::info!(
        week_start = %window.start,
        records = parsed.records.len(),
        skipped = parsed.diagnostics.len(),
        blank = parsed.blank,
        salespeople = entries.len(),
        "Compiled the {} leaderboard.",
        primary
    );

    Ok(Leaderboard {
        window,
        primary,
        entries,
        diagnostics: parsed.diagnostics,
    })
}

/* Rendering: */

/**
 * Title line of the leaderboard.
 */
pub fn title(primary: Metric) -> String {
    format!("🏆 Weekly Leaderboard: {} 🏆", primary)
}

fn week_span(window: &WeekWindow) -> String {
    format!(
        "{} - {}",
        window.start.format("%b %d"),
        window.end.format("%b %d")
    )
}

fn rank_marker(rank: usize) -> String {
    match rank {
        1 => "🥇".to_string(),
        2 => "🥈".to_string(),
        3 => "🥉".to_string(),
        n => format!("{}.", n),
    }
}

fn display_name(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_CHARS {
        return name.to_string();
    }
    let mut short: String = name.chars().take(MAX_NAME_CHARS - 1).collect();
    short.push('…');
    short
}

fn entry_line(rank: usize, entry: &LeaderboardEntry, primary: Metric) -> String {
    let mut line = format!("{} **{}**", rank_marker(rank), display_name(entry.name()));
    for metric in Metric::ALL {
        let value = entry.totals().get(metric);
        if metric == primary {
            let _ = write!(line, " · {}: **{}**", metric, value);
        } else {
            let _ = write!(line, " · {}: {}", metric, value);
        }
    }
    line.push('\n');
    line
}

/**
 * Renders the leaderboard body: the week span, then one line per salesperson with every metric
 * (the ranking one in bold), at most `top_n` of them.
 *
 * The result always fits in an embed description: long names are shortened, and lines that
 * would not fit are counted in the "…and N more." line instead.
 */
pub fn render(board: &Leaderboard, top_n: usize) -> String {
    let mut out = String::new();

    if board.entries.is_empty() {
        let _ = writeln!(out, "No activity this week ({}).", week_span(&board.window));
    } else {
        let _ = writeln!(out, "{} from {}\n", board.primary, week_span(&board.window));

        let mut shown = 0;
        for (i, entry) in board.entries.iter().take(top_n).enumerate() {
            let line = entry_line(i + 1, entry, board.primary);
            if out.chars().count() + line.chars().count() > DESCRIPTION_LIMIT - FOOTER_RESERVE {
                break;
            }
            out.push_str(&line);
            shown += 1;
        }

        if board.entries.len() > shown {
            let _ = writeln!(out, "…and {} more.", board.entries.len() - shown);
        }
    }

    if !board.diagnostics.is_empty() {
        let listed = board
            .diagnostics
            .iter()
            .take(LISTED_DIAGNOSTICS)
            .map(|d| format!("row {} ({})", d.row, d.field))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(
            out,
            "\n⚠️ Skipped {} malformed row(s): {}",
            board.diagnostics.len(),
            listed
        );
        if board.diagnostics.len() > LISTED_DIAGNOSTICS {
            out.push_str(", …");
        }
        out.push('.');
    }

    out.trim_end().to_string()
}
