//! Interactive state machine session.

use colored::Colorize;
use glang_core::{create_state_machine, StateMachine, TransitionEvent};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;

const HELP_TEXT: &str = r#"
Available commands:
  help                    Show this help
  state                   Show the current state
  history                 Show previous states
  events                  List events accepted in the current state
  reset                   Return to the initial state

  <event> [payload_json]  Fire an event, e.g. `start` or `chunk {"text":"hi"}`

  quit, exit              Exit the REPL
"#;

pub fn run(kind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = create_state_machine(kind)?;

    println!("{}", format!("glang {} machine", kind).bold().cyan());

    // Transitions are reported from the bus rather than the return value,
    // the way an adapter would observe them.
    machine.subscribe("transition", |e: &TransitionEvent| {
        println!("  {} → {}", e.from, e.to.yellow());
    });
    machine.subscribe("reset", |e: &TransitionEvent| {
        println!("  {} → {} (reset)", e.from, e.to.yellow());
    });

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".glang_history"))
        .unwrap_or_else(|_| ".glang_history".into());
    let _ = rl.load_history(&history_path);

    println!("State: {}", machine.state().yellow());
    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", format!("{}:{}>", kind, machine.state()).cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut machine, line) {
                    Ok(Some(output)) if output.is_empty() => {}
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

/// Runs one REPL line. `Ok(None)` means exit.
fn execute_repl_command(
    machine: &mut StateMachine,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "state" => Ok(Some(machine.state().yellow().to_string())),

        "history" => {
            if machine.history().is_empty() {
                return Ok(Some("No history".dimmed().to_string()));
            }
            Ok(Some(machine.history().join(" → ")))
        }

        "events" => {
            let events = machine.available_events();
            if events.is_empty() {
                return Ok(Some(
                    format!("No events accepted in '{}'", machine.state())
                        .yellow()
                        .to_string(),
                ));
            }
            Ok(Some(events.join(", ")))
        }

        "reset" => {
            machine.reset();
            Ok(Some(String::new()))
        }

        _ => {
            // Event names are case-sensitive
            let payload = if rest.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(rest)?
            };
            machine.transition(cmd, payload)?;
            Ok(Some(String::new()))
        }
    }
}
