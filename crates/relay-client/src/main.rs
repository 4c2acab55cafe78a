//! # relay-chat
//!
//! Interactive chat client for the relay server, plus a two-user demo.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Result, bail, ensure};
use clap::{Parser, Subcommand};
use relay_client::{ChatClient, ChatEvent};
use relay_core::{CloseReason, RelayedMessage};
use relay_logging::LogFormat;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long the demo waits for relayed messages before moving on.
const DEMO_RECEIVE_WINDOW: Duration = Duration::from_millis(500);

/// Relay chat client.
#[derive(Parser, Debug)]
#[command(name = "relay-chat", about = "Chat through a relay server")]
struct Cli {
    /// Server base URL.
    #[arg(long, default_value = "ws://127.0.0.1:5555")]
    url: String,

    /// Log level for client diagnostics (stderr).
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,

    /// Username to chat as.
    username: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Log in two users, exchange a greeting, list users, log out.
    Demo,
}

/// Line printed for a received message.
fn format_message(me: &str, message: &RelayedMessage) -> String {
    format!("{me} -> [{}]: {}", message.sender_username, message.body)
}

fn describe_close(reason: Option<CloseReason>) -> String {
    match reason {
        Some(reason) => format!("chat stream closed: {reason}"),
        None => "chat stream closed".to_owned(),
    }
}

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Users,
    Quit,
    Send(&'a str),
    Nothing,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Nothing,
        "/users" => Input::Users,
        "/quit" => Input::Quit,
        body => Input::Send(body),
    }
}

async fn interactive(url: &str, username: &str) -> Result<()> {
    let mut client = ChatClient::connect(url).await?;
    if !client.login(username).await? {
        bail!("username '{username}' is already taken");
    }
    println!("Logged in as {username}. /users lists users, /quit logs out.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Input::Nothing => {}
                    Input::Users => {
                        for user in client.list_users().await? {
                            println!("{user}");
                        }
                    }
                    Input::Quit => break,
                    Input::Send(body) => client.send(body).await?,
                }
            }
            event = client.next_message() => match event? {
                ChatEvent::Message(message) => println!("{}", format_message(username, &message)),
                ChatEvent::Closed(reason) => {
                    println!("{}", describe_close(reason));
                    break;
                }
            },
        }
    }

    if client.logout().await? {
        println!("Logged out.");
    }
    Ok(())
}

/// Print every message that arrives within the receive window.
async fn print_received(me: &str, client: &mut ChatClient) -> Result<()> {
    while let Ok(event) = tokio::time::timeout(DEMO_RECEIVE_WINDOW, client.next_message()).await {
        match event? {
            ChatEvent::Message(message) => println!("{}", format_message(me, &message)),
            ChatEvent::Closed(reason) => {
                println!("{me}: {}", describe_close(reason));
                break;
            }
        }
    }
    Ok(())
}

async fn demo(url: &str) -> Result<()> {
    let mut user1 = ChatClient::connect(url).await?;
    let mut user2 = ChatClient::connect(url).await?;

    ensure!(user1.login("user1").await?, "Failed to login as user1");
    ensure!(user2.login("user2").await?, "Failed to login as user2");

    user1.send("Hello World!").await?;
    println!("Message send -> [user1]: Hello World!");
    user2.send("Hello World!").await?;
    println!("Message send -> [user2]: Hello World!");

    print_received("user1", &mut user1).await?;
    print_received("user2", &mut user2).await?;

    for (name, client) in [("user1", &mut user1), ("user2", &mut user2)] {
        println!("Users seen by {name}:");
        for user in client.list_users().await? {
            println!("  {user}");
        }
    }

    ensure!(user1.logout().await?, "Failed to logout user1");
    ensure!(user2.logout().await?, "Failed to logout user2");
    println!("Both users logged out.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    relay_logging::init_subscriber(&cli.log_level, LogFormat::Compact);

    match (cli.command, cli.username) {
        (Some(Command::Demo), _) => demo(&cli.url).await,
        (None, Some(username)) => interactive(&cli.url, &username).await,
        (None, None) => bail!("a username is required (or use `relay-chat demo`)"),
    }
}
