//! Minimal interactive front end.
//!
//! Stands in for the graphical surface: plain lines submit a chat turn into
//! the active session, slash commands drive the session list, the grounding
//! toggle, and the class generator. All state lives in the store and the
//! runners; this module only routes lines to them and prints results.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use kismet_store::{Sender, SessionMode, SessionStore};

use crate::chat::{ChatTurnRunner, TurnOutcome};
use crate::codegen::{ClassGenerator, ClassRequest, GenerateOutcome, ParentClass};

const HELP_TEXT: &str = "\
Commands:
  /new [blueprint]   start a new chat (optionally in Blueprint mode)
  /list              list sessions, most recent first
  /open <n>          switch to session <n> from /list
  /delete <n>        delete session <n> from /list
  /grounding         toggle search grounding for chat turns
  /gen <name> <parent> <features...>
                     generate a UE5 C++ class
  /help              show this help
  /quit              exit

Anything else is sent to the assistant as a chat message.";

pub async fn run(
    store: &mut SessionStore,
    chat: &mut ChatTurnRunner,
    generator: &mut ClassGenerator,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut grounding_enabled = false;

    println!("kismet — Unreal Engine assistant. /help for commands.");
    print_active(store);

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if !handle_command(store, generator, &mut grounding_enabled, command).await {
                break;
            }
        } else {
            submit_turn(store, chat, &line, grounding_enabled).await;
        }
    }

    Ok(())
}

/// Returns false when the loop should exit.
async fn handle_command(
    store: &mut SessionStore,
    generator: &mut ClassGenerator,
    grounding_enabled: &mut bool,
    command: &str,
) -> bool {
    let (word, rest) = match command.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (command, ""),
    };

    match word {
        "quit" | "exit" => return false,
        "help" => println!("{HELP_TEXT}"),
        "new" => {
            let mode = if rest.eq_ignore_ascii_case("blueprint") {
                SessionMode::Blueprint
            } else {
                SessionMode::Chat
            };
            store.create_session(mode);
            print_active(store);
        }
        "list" => {
            for (index, session) in store.sessions_by_recency().iter().enumerate() {
                let marker = if session.id == store.active_session_id() {
                    '*'
                } else {
                    ' '
                };
                println!(
                    "{marker} {index}: {} [{}]",
                    session.title,
                    mode_label(session.mode)
                );
            }
        }
        "open" => match parse_index(store, rest) {
            Some(id) => {
                store.select_session(id);
                print_active(store);
            }
            None => println!("usage: /open <n> (see /list)"),
        },
        "delete" => match parse_index(store, rest) {
            Some(id) => {
                store.delete_session(id);
                print_active(store);
            }
            None => println!("usage: /delete <n> (see /list)"),
        },
        "grounding" => {
            *grounding_enabled = !*grounding_enabled;
            println!(
                "search grounding {}",
                if *grounding_enabled { "on" } else { "off" }
            );
        }
        "gen" => run_generation(generator, rest).await,
        _ => println!("unknown command /{word}; /help for commands"),
    }

    true
}

async fn submit_turn(
    store: &mut SessionStore,
    chat: &mut ChatTurnRunner,
    input: &str,
    grounding_enabled: bool,
) {
    let outcome = chat
        .submit(store, input, grounding_enabled, |delta| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .await;
    println!();

    match outcome {
        TurnOutcome::Ignored => println!("(dropped: empty input or a turn already in flight)"),
        TurnOutcome::Settled => print_sources(store),
        TurnOutcome::Failed => {
            if let Some(session) = store.active_session()
                && let Some(message) = session.messages.last()
                && message.is_error
            {
                println!("{}", message.text);
            }
        }
    }
}

async fn run_generation(generator: &mut ClassGenerator, rest: &str) {
    let mut fields = rest.splitn(3, char::is_whitespace);
    let (Some(class_name), Some(parent_raw)) = (fields.next(), fields.next()) else {
        println!("usage: /gen <name> <parent> <features...>");
        return;
    };

    let Some(parent) = ParentClass::parse(parent_raw) else {
        let options: Vec<&str> = ParentClass::ALL
            .into_iter()
            .map(ParentClass::type_name)
            .collect();
        println!("unknown parent class {parent_raw}; options: {}", options.join(", "));
        return;
    };

    let request = ClassRequest {
        class_name: class_name.to_string(),
        parent,
        features: fields.next().unwrap_or_default().to_string(),
    };

    println!("generating {}...", request.class_name);
    match generator.generate(&request).await {
        GenerateOutcome::Ignored => println!("(a generation is already in flight)"),
        GenerateOutcome::Done | GenerateOutcome::Failed => println!("{}", generator.output()),
    }
}

fn print_active(store: &SessionStore) {
    if let Some(session) = store.active_session() {
        println!("[{} — {}]", session.title, mode_label(session.mode));
        // Surface the seeded welcome (or restored transcript tail) so a
        // fresh session isn't a blank prompt.
        if let Some(message) = session.messages.last()
            && message.sender == Sender::Assistant
            && !message.text.is_empty()
        {
            println!("{}", message.text);
        }
    }
}

fn print_sources(store: &SessionStore) {
    let Some(session) = store.active_session() else {
        return;
    };
    let Some(message) = session
        .messages
        .iter()
        .rev()
        .find(|message| message.sender == Sender::Assistant)
    else {
        return;
    };
    let Some(sources) = &message.sources else {
        return;
    };

    println!("Sources:");
    for source in sources {
        println!("  {} <{}>", source.display_title(), source.uri);
    }
}

fn mode_label(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Chat => "Chat",
        SessionMode::Blueprint => "Blueprint",
    }
}

fn parse_index(store: &SessionStore, rest: &str) -> Option<kismet_store::SessionId> {
    let index: usize = rest.parse().ok()?;
    store
        .sessions_by_recency()
        .get(index)
        .map(|session| session.id)
}
