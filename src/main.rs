use std::error::Error;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod delivery;
mod handlers;
mod providers;
mod state;
#[cfg(test)]
mod test_support;
mod utils;

use config::{log_level_from_env, Config};
use handlers::commands::{self, GeneratorKind};
use handlers::invocation::CommandInvocation;
use state::AppState;
use utils::logging::init_logging;
use utils::telegram::build_bot;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
    Generate(String),
    Diffuse(String),
    Waifu2x,
    Anime,
    AnimeSeed(String),
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging(&log_level_from_env());

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {err}");
            return Err(err.into());
        }
    };

    let bot = build_bot(&config.bot_token, config.http_timeout)?;
    let state = AppState::from_config(bot.clone(), &config)?;
    info!(
        "Starting image relay bot (log_level={}, max_attempts={}, backoff={}..={}s, http_timeout={:?})",
        config.log_level,
        state.retry_policy.max_attempts,
        state.retry_policy.backoff_min_secs,
        state.retry_policy.backoff_max_secs,
        config.http_timeout
    );

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .endpoint(ignore_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(state: AppState, message: Message, command: Command) -> HandlerResult {
    match command {
        Command::Start => {
            let invocation = CommandInvocation::from_message(&message, String::new());
            commands::start_handler(&state, &invocation).await?
        }
        Command::Help => {
            let invocation = CommandInvocation::from_message(&message, String::new());
            commands::help_handler(&state, &invocation).await?
        }
        Command::Generate(arg) => {
            let invocation = CommandInvocation::from_message(&message, arg);
            tokio::spawn(async move {
                if let Err(err) =
                    commands::generate_handler(state, invocation, GeneratorKind::Craiyon).await
                {
                    error!("generate handler failed: {err}");
                }
            });
        }
        Command::Diffuse(arg) => {
            let invocation = CommandInvocation::from_message(&message, arg);
            tokio::spawn(async move {
                if let Err(err) =
                    commands::generate_handler(state, invocation, GeneratorKind::Diffusion).await
                {
                    error!("diffuse handler failed: {err}");
                }
            });
        }
        Command::Waifu2x => {
            let invocation = CommandInvocation::from_message(&message, String::new());
            tokio::spawn(async move {
                if let Err(err) = commands::waifu2x_handler(state, invocation).await {
                    error!("waifu2x handler failed: {err}");
                }
            });
        }
        Command::Anime => {
            let invocation = CommandInvocation::from_message(&message, String::new());
            tokio::spawn(async move {
                if let Err(err) = commands::seed_image_handler(state, invocation, false).await {
                    error!("anime handler failed: {err}");
                }
            });
        }
        Command::AnimeSeed(arg) => {
            let invocation = CommandInvocation::from_message(&message, arg);
            tokio::spawn(async move {
                if let Err(err) = commands::seed_image_handler(state, invocation, true).await {
                    error!("animeseed handler failed: {err}");
                }
            });
        }
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
