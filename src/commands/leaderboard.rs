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
use crate::error::LeaderboardError;
use crate::leaderboard::{self as board, Leaderboard};
use crate::sheets::SheetClient;
use crate::utils::BotConfig;
use crate::{Context, Error};
use chrono::NaiveDate;
use poise::serenity_prelude::{Colour, CreateEmbed, CreateEmbedFooter, Timestamp};
use poise::CreateReply;

/**
 * Activity choices offered by the command. Mirrors `Metric`.
 */
#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum MetricChoice {
    Dials,
    Doorknocks,
    Appointments,
    Presentations,
}

impl From<MetricChoice> for Metric {
    fn from(choice: MetricChoice) -> Metric {
        match choice {
            MetricChoice::Dials => Metric::Dials,
            MetricChoice::Doorknocks => Metric::Doorknocks,
            MetricChoice::Appointments => Metric::Appointments,
            MetricChoice::Presentations => Metric::Presentations,
        }
    }
}

/**
 * Reads the sheet and compiles the leaderboard for the week of `today`.
 */
async fn build(
    sheets: &SheetClient,
    config: &BotConfig,
    primary: Metric,
    today: NaiveDate,
) -> Result<Leaderboard, LeaderboardError> {
    let rows = sheets.fetch_rows().await?;

    board::compile(&rows, &config.sheet, &config.board, primary, today)
}

#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    description_localized("en-US", "Show this week's sales leaderboard.")
)]
#[salesboard::log_cmd]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "The activity to rank by (defaults to the configured one)."] metric: Option<
        MetricChoice,
    >,
) -> Result<(), Error> {
    ctx.defer().await?;

    let data = ctx.data();
    let primary = metric.map(Metric::from).unwrap_or(data.config.board.primary);
    let today = data.config.board.today();

    let board = match build(&data.sheets, &data.config, primary, today).await {
        Ok(board) => board,
        Err(err) => {
            tracing::error!(
                "[leaderboard] Could not compile the leaderboard for <@{}>: {}",
                ctx.author().id,
                err
            );
            ctx.reply(err.user_message()).await?;

            return Ok(());
        }
    };

    let colour = if board.entries.is_empty() {
        Colour::ORANGE
    } else {
        Colour::GOLD
    };
    let embed = CreateEmbed::new()
        .title(board::title(primary))
        .description(board::render(&board, data.config.board.top_n))
        .colour(colour)
        .footer(CreateEmbedFooter::new("Leaderboard generated"))
        .timestamp(Timestamp::now());

    ctx.send(CreateReply::default().embed(embed)).await?;
    tracing::info!(
        metric = %primary,
        entries = board.entries.len(),
        "[leaderboard] Sent the weekly leaderboard."
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SheetError;
    use crate::sheets::test_support::*;
    use crate::utils::BoardConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn choices_map_to_metrics() {
        assert_eq!(Metric::from(MetricChoice::Dials), Metric::Dials);
        assert_eq!(Metric::from(MetricChoice::Doorknocks), Metric::Doorknocks);
        assert_eq!(Metric::from(MetricChoice::Appointments), Metric::Appointments);
        assert_eq!(Metric::from(MetricChoice::Presentations), Metric::Presentations);
    }

    #[test]
    fn command_takes_an_optional_metric() {
        let command = leaderboard();
        assert_eq!(command.name, "leaderboard");
        assert_eq!(command.parameters.len(), 1);
        assert!(!command.parameters[0].required);
    }

    #[tokio::test]
    async fn unreadable_sheet_gets_a_short_reply() {
        let server = MockServer::start_async().await;
        let credentials = credentials_file(&server);
        let _token = mock_token(&server).await;
        let _meta = mock_metadata(&server).await;
        let _values = server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/values/");
                then.status(403).json_body(json!({
                    "error": {"code": 403, "message": "The caller does not have permission"}
                }));
            })
            .await;

        let sheet = config(&credentials, "https://docs.google.com/spreadsheets/d/sheet-id");
        let sheets = SheetClient::open(&sheet, endpoints(&server))
            .await
            .expect("open succeeds");
        let config = BotConfig {
            discord_token: "token".to_string(),
            guild_id: None,
            command_prefix: None,
            sheet,
            board: BoardConfig::default(),
        };
        let today = NaiveDate::from_ymd_opt(2025, 10, 22).unwrap();

        let err = build(&sheets, &config, Metric::Dials, today)
            .await
            .expect_err("the leaderboard cannot be built");

        assert!(matches!(
            err,
            LeaderboardError::SourceUnavailable(SheetError::Api { status: 403, .. })
        ));
        assert!(err.user_message().contains("Could not access"));
    }
}
