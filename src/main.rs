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
mod activity;
mod commands;
mod error;
mod leaderboard;
mod sheets;
mod utils;
mod week;

use crate::sheets::{Endpoints, SheetClient};
use crate::utils::BotConfig;
use poise::serenity_prelude as serenity;
use std::process::ExitCode;
use std::sync::Arc;

/* Poise-required data types: */

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;
// User data:
pub struct Data {
    sheets: Arc<SheetClient>,
    config: BotConfig,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        // Ready (bot is started):
        serenity::FullEvent::Ready { data_about_bot, .. } => {
            tracing::info!(
                "{} is connected, serving {} guild(s).",
                data_about_bot.user.tag(),
                data_about_bot.guilds.len()
            );
            ctx.set_presence(
                Some(serenity::ActivityData::watching(format!(
                    "{} · {}",
                    data.config.sheet.spreadsheet, data.config.sheet.worksheet
                ))),
                serenity::OnlineStatus::Online,
            );
        }
        // Guild create (the bot joins a new server):
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                tracing::info!("Entered the guild {} ({}).", guild.name, guild.id);
            }
        }
        _ => {}
    }

    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                "Command `{}` failed for {}: {}",
                ctx.command().qualified_name,
                ctx.author().tag(),
                error
            );
            if let Err(err) = ctx
                .reply("**Error:** Something went wrong while running the command.")
                .await
            {
                tracing::warn!("Could not report the error to the user: {}", err);
            }
        }
        other => {
            if let Err(err) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling a framework error: {}", err);
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    utils::init_logging();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    // The sheet must be reachable before connecting to Discord:
    let sheets = match SheetClient::open(&config.sheet, Endpoints::default()).await {
        Ok(sheets) => Arc::new(sheets),
        Err(err) => {
            tracing::error!("Could not open the Google Sheet: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut intents = serenity::GatewayIntents::non_privileged();
    if config.command_prefix.is_some() {
        intents |= serenity::GatewayIntents::MESSAGE_CONTENT;
    }
    let token = config.discord_token.clone();
    let prefix = config.command_prefix.clone();
    let data_sheets = Arc::clone(&sheets);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix,
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                let commands = &framework.options().commands;
                match config.guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(ctx, commands, guild_id).await?;
                        tracing::info!("Registered {} command(s) in guild {}.", commands.len(), guild_id);
                    }
                    None => {
                        poise::builtins::register_globally(ctx, commands).await?;
                        tracing::info!("Registered {} command(s) globally.", commands.len());
                    }
                }

                Ok(Data {
                    sheets: data_sheets,
                    config,
                })
            })
        })
        .build();

    let mut client = match serenity::Client::builder(&token, intents)
        .framework(framework) // For command handling, using poise.
        .await
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!("Could not create the Discord client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down.");
            shard_manager.shutdown_all().await;
        }
    });

    let result = client.start().await;
    sheets.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("The Discord client stopped: {}", err);
            ExitCode::FAILURE
        }
    }
}
