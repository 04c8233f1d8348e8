use crate::session::{EngineCommand, SessionHandle};
use crate::settings::SettingsClient;
use crate::types::LogLevel;
use anyhow::Result;
use log::{error, info, warn};
use std::collections::BTreeSet;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP: &str = "\
commands:
  /client <id>       show one client (loads its history)
  /all               show all clients
  /levels A,B,...    show only these levels (or 'all' / 'none')
  /toggle <LEVEL>    toggle one level
  /find [text]       keyword filter, empty to reset
  /clear             clear the log buffer
  /retry             reconnect after giving up
  /config            show server settings
  /config set <n>    change max_logs_per_client
  /quit              exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Engine(EngineCommand),
    ShowSettings,
    UpdateSettings(String),
    Help,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim_start();
    // `raw` keeps its spacing so a keyword can start or end with blanks
    let (name, raw) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = raw.trim();

    let command = match name {
        "/client" => {
            if rest.is_empty() {
                return Err("usage: /client <id>".to_string());
            }
            EngineCommand::SetScope(Some(rest.to_string()))
        }
        "/all" => EngineCommand::SetScope(None),
        "/levels" => EngineCommand::SetLevels(parse_levels(rest)?),
        "/toggle" => EngineCommand::ToggleLevel(rest.parse()?),
        "/find" => EngineCommand::SetKeyword(raw.to_string()),
        "/clear" => EngineCommand::Clear,
        "/retry" => EngineCommand::Retry,
        "/quit" | "/exit" => EngineCommand::Quit,
        "/config" => {
            return match rest.split_once(char::is_whitespace) {
                None if rest.is_empty() => Ok(ConsoleCommand::ShowSettings),
                Some(("set", value)) => Ok(ConsoleCommand::UpdateSettings(value.trim().to_string())),
                _ => Err("usage: /config [set <n>]".to_string()),
            };
        }
        "/help" | "?" => return Ok(ConsoleCommand::Help),
        "" => return Err("empty command".to_string()),
        other => return Err(format!("Unknown command: {}", other)),
    };

    Ok(ConsoleCommand::Engine(command))
}

fn parse_levels(text: &str) -> Result<BTreeSet<LogLevel>, String> {
    match text.to_lowercase().as_str() {
        "" | "all" => return Ok(LogLevel::ALL.into_iter().collect()),
        "none" => return Ok(BTreeSet::new()),
        _ => {}
    }

    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.parse::<LogLevel>())
        .collect()
}

pub async fn execute_command(
    command: ConsoleCommand,
    handle: &SessionHandle,
    settings: &SettingsClient,
) -> Result<()> {
    match command {
        ConsoleCommand::Engine(command) => handle.send(command).await?,

        ConsoleCommand::ShowSettings => match settings.fetch().await {
            Ok(current) => println!("max_logs_per_client = {}", current.max_logs_per_client),
            Err(e) => println!("Failed to load settings: {}", e),
        },

        ConsoleCommand::UpdateSettings(input) => match settings.update(&input).await {
            Ok(updated) => println!(
                "Settings saved: max_logs_per_client = {}",
                updated.max_logs_per_client
            ),
            Err(e) => println!("{}", e),
        },

        ConsoleCommand::Help => println!("{}", HELP),
    }

    Ok(())
}

/// Reads console commands from stdin until `/quit` or end of input.
pub async fn read_commands(handle: SessionHandle, settings: SettingsClient) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{} (try /help)", message);
                continue;
            }
        };
        let quit = command == ConsoleCommand::Engine(EngineCommand::Quit);

        if let Err(e) = execute_command(command, &handle, &settings).await {
            warn!("Failed to execute command: {}", e);
            return;
        }
        if quit {
            return;
        }
    }
}
