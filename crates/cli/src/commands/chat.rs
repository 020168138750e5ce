use super::{report_error, success, Context};
use crate::render::{render_message, render_response};
use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

pub const DEFAULT_TITLE: &str = "New Chat Session";

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List chat sessions
    List,
    /// Delete a chat session
    Delete { id: String },
    /// Show the messages of a chat session
    History { id: String },
}

#[derive(Debug, PartialEq, Eq)]
enum ReplInput<'a> {
    Quit,
    History,
    Help,
    Empty,
    Message(&'a str),
}

fn parse_input(line: &str) -> ReplInput<'_> {
    match line.trim() {
        "" => ReplInput::Empty,
        "/quit" | "/exit" => ReplInput::Quit,
        "/history" => ReplInput::History,
        "/help" => ReplInput::Help,
        message => {
            // Dig-deeper suggestions are sent back as their action id.
            let message = message.strip_prefix("/action ").unwrap_or(message);
            ReplInput::Message(message)
        }
    }
}

pub async fn run(ctx: &mut Context, session: Option<String>, title: Option<String>) -> Result<()> {
    ctx.require_login().await?;

    let session_id = match session {
        Some(id) => id,
        None => {
            let title = title.as_deref().unwrap_or(DEFAULT_TITLE);
            let id = ctx.client.create_chat_session(title).await?;
            success(&format!("Started chat session {id}"));
            id
        }
    };
    println!("{}", "Ask about your campaigns. /history, /help, /quit".dimmed());

    loop {
        let Ok(line) = ctx.console.text("you").await else {
            break;
        };

        match parse_input(&line) {
            ReplInput::Quit => break,
            ReplInput::Empty => continue,
            ReplInput::Help => {
                println!("  /history        show this session's messages");
                println!("  /action <id>    follow a suggested action");
                println!("  /quit           leave the chat");
            }
            ReplInput::History => print_history(ctx, &session_id).await?,
            ReplInput::Message(message) => match ctx.client.send_chat_message(message, &session_id).await {
                Ok(reply) => {
                    println!("{}", "assistant>".magenta().bold());
                    for line in render_response(reply.effective_response()) {
                        println!("  {line}");
                    }
                }
                Err(e) => {
                    let e = anyhow::Error::new(e);
                    if super::login_required(&e).is_some() {
                        return Err(e);
                    }
                    report_error("Failed to send message", &e);
                }
            },
        }
    }
    Ok(())
}

pub async fn sessions(ctx: &Context, command: SessionCommands) -> Result<()> {
    ctx.require_login().await?;
    match command {
        SessionCommands::List => {
            let sessions = ctx.client.list_chat_sessions().await?;
            if sessions.is_empty() {
                println!("No chat sessions yet.");
            }
            for session in sessions {
                let updated = session
                    .updated_at
                    .or(session.created_at)
                    .unwrap_or_default();
                println!("{}  {}  {}", session.id.bold(), session.title, updated.dimmed());
            }
        }
        SessionCommands::Delete { id } => {
            ctx.client.delete_chat_session(&id).await?;
            success(&format!("Deleted chat session {id}"));
        }
        SessionCommands::History { id } => print_history(ctx, &id).await?,
    }
    Ok(())
}

async fn print_history(ctx: &Context, session_id: &str) -> Result<()> {
    let messages = ctx.client.chat_history(session_id).await?;
    if messages.is_empty() {
        println!("No messages in this session.");
    }
    for message in &messages {
        for line in render_message(message) {
            println!("{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repl_commands_are_recognised() {
        assert_eq!(parse_input("  /quit "), ReplInput::Quit);
        assert_eq!(parse_input(""), ReplInput::Empty);
        assert_eq!(parse_input("/history"), ReplInput::History);
        assert_eq!(parse_input("/action dig_campaigns_2"), ReplInput::Message("dig_campaigns_2"));
        assert_eq!(parse_input("why is CPC up?"), ReplInput::Message("why is CPC up?"));
    }
}
