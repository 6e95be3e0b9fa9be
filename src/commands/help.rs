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
use crate::{Context, Error};
use chrono::Weekday;

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[poise::command(
    slash_command,
    prefix_command,
    ephemeral,
    description_localized("en-US", "Get help for using the sales leaderboard.")
)]
#[salesboard::log_cmd]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let board = &ctx.data().config.board;
    let metrics = Metric::ALL.map(|m| m.label().to_lowercase()).join(", ");

    ctx.reply(format!(
        "**Weekly sales leaderboard**\n\
        `/leaderboard` shows this week's totals per salesperson, ranked by {}.\n\
        `/leaderboard metric:<activity>` ranks by another activity ({}).\n\
        Weeks start on {}. Ties are broken by {}, then by name.",
        board.primary.label().to_lowercase(),
        metrics,
        weekday_name(board.week_start),
        board.secondary.label().to_lowercase()
    ))
    .await?;

    Ok(())
}
