//! Command-line interface and REPL
//!
//! The REPL runs on its own thread (rustyline blocks) and hands parsed
//! commands to the main loop.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Start,
    Stop,
    Status,
    Host(String),
    Port(u16),
    Name(String),
    Autoconnect(bool),
    Help,
    Quit,
}

impl CliCommand {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "" => return Ok(None),
            "start" | "connect" => CliCommand::Start,
            "stop" | "disconnect" => CliCommand::Stop,
            "status" => CliCommand::Status,
            "host" => CliCommand::Host(required(rest, "host <name-or-ip>")?.to_string()),
            "port" => {
                let raw = required(rest, "port <1-65535>")?;
                match raw.parse::<u16>() {
                    Ok(port) if port > 0 => CliCommand::Port(port),
                    _ => return Err(format!("Invalid port '{}'", raw)),
                }
            },
            "name" => CliCommand::Name(required(rest, "name <endpoint-name>")?.to_string()),
            "autoconnect" => match rest.to_lowercase().as_str() {
                "on" | "true" => CliCommand::Autoconnect(true),
                "off" | "false" => CliCommand::Autoconnect(false),
                _ => return Err("Usage: autoconnect on|off".to_string()),
            },
            "help" | "?" => CliCommand::Help,
            "quit" | "exit" => CliCommand::Quit,
            other => return Err(format!("Unknown command '{}', try 'help'", other)),
        };
        Ok(Some(command))
    }
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str, String> {
    if value.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(value)
    }
}

pub fn print_help() {
    println!("\n{}", "=== Commands ===".bold().cyan());
    println!("  {}            connect with the current settings", "start".green());
    println!("  {}             disconnect", "stop".green());
    println!("  {}           show connection state and settings", "status".green());
    println!("  {}      set the remote host", "host <h>".green());
    println!("  {}      set the remote port", "port <p>".green());
    println!("  {}      set the UMP endpoint name", "name <n>".green());
    println!("  {} connect on next launch", "autoconnect on|off".green());
    println!("  {}             leave", "quit".green());
    println!();
}

/// Run the REPL on a dedicated thread, sending commands to `tx`
///
/// The thread ends on `quit`, EOF/CTRL+C, or once the receiver is gone.
pub fn spawn_repl(tx: mpsc::UnboundedSender<CliCommand>) -> Result<std::thread::JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("repl".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    warn!("Cannot start the command prompt: {}", e);
                    return;
                },
            };
            repl_loop(&mut rl, &tx);
        })?;

    Ok(handle)
}

fn repl_loop(rl: &mut DefaultEditor, tx: &mpsc::UnboundedSender<CliCommand>) {
    loop {
        match rl.readline("nakama> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match CliCommand::parse(&line) {
                    Ok(Some(command)) => {
                        let quit = command == CliCommand::Quit;
                        if tx.send(command).is_err() || quit {
                            break;
                        }
                    },
                    Ok(None) => {},
                    Err(msg) => println!("{}", msg.yellow()),
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                debug!("REPL closed");
                let _ = tx.send(CliCommand::Quit);
                break;
            },
            Err(e) => {
                warn!("REPL error: {}", e);
                let _ = tx.send(CliCommand::Quit);
                break;
            },
        }
    }
}
