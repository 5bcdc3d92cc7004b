//! Command execution.

use crate::{Commands, Context};
use colored::Colorize;
use glang_core::{builtin_machines, create_state_machine, Diagnostic, PrimitiveSchema};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Formatted command output. `ok` is false when the command should exit
/// with a failure status.
pub struct Output {
    pub text: String,
    pub ok: bool,
}

impl Output {
    fn ok(text: String) -> Self {
        Self { text, ok: true }
    }

    fn failed(text: String) -> Self {
        Self { text, ok: false }
    }
}

/// Executes a one-shot command and returns the formatted output.
pub async fn execute(ctx: &Context, cmd: Commands) -> Result<Output, Box<dyn std::error::Error>> {
    match cmd {
        // The REPL is interactive and handled in main.rs
        Commands::Repl { .. } => unreachable!(),

        Commands::Parse { input } => {
            let source = read_input(&input)?;
            let result = ctx.parser.parse_async(&source).await;
            match result.into_result() {
                Ok(tree) => Ok(Output::ok(serde_json::to_string_pretty(&tree)?)),
                Err(errors) => Ok(Output::failed(format_diagnostics(&input, &errors))),
            }
        }

        Commands::Check { files } => {
            let mut output = String::new();
            let mut all_ok = true;
            for path in &files {
                let label = path.display().to_string();
                let source = std::fs::read_to_string(path)?;
                let result = ctx.parser.parse(&source);
                if result.is_ok() {
                    output.push_str(&format!("{} {}\n", "ok".green(), label));
                } else {
                    all_ok = false;
                    output.push_str(&format_diagnostics(&label, &result.errors));
                }
            }
            let output = output.trim_end().to_string();
            Ok(if all_ok {
                Output::ok(output)
            } else {
                Output::failed(output)
            })
        }

        Commands::Primitives => {
            let mut output = String::new();
            for (kind, schema) in ctx.registry.get_all_primitives() {
                let source = ctx
                    .registry
                    .source_of(&kind)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                output.push_str(&format!("{} [{}]\n", kind.cyan().bold(), source.dimmed()));
                output.push_str(&format_schema(&schema));
            }
            Ok(Output::ok(output.trim_end().to_string()))
        }

        Commands::Machines => {
            let mut output = String::new();
            for (kind, config) in builtin_machines() {
                output.push_str(&format!(
                    "{} (initial: {}, checksum: {})\n",
                    kind.cyan().bold(),
                    config.initial().yellow(),
                    config.checksum
                ));
                for state in config.states() {
                    let events = config.events_from(state);
                    if events.is_empty() {
                        output.push_str(&format!("  {}\n", state));
                        continue;
                    }
                    let arrows: Vec<String> = events
                        .iter()
                        .filter_map(|e| {
                            config
                                .get_transition(state, e)
                                .map(|to| format!("{} → {}", e, to))
                        })
                        .collect();
                    output.push_str(&format!("  {}: {}\n", state, arrows.join(", ")));
                }
            }
            Ok(Output::ok(output.trim_end().to_string()))
        }

        Commands::Run { machine, events } => {
            let mut instance = create_state_machine(&machine)?;
            let mut output = format!("{} {}\n", machine.cyan().bold(), instance.state().yellow());
            for event in &events {
                match instance.transition(event, Value::Null) {
                    Ok(t) => {
                        output.push_str(&format!(
                            "  {} {} → {}\n",
                            t.event.cyan(),
                            t.from,
                            t.to.yellow()
                        ));
                    }
                    Err(e) => {
                        output.push_str(&format!("{}: {}", "Error".red(), e));
                        return Ok(Output::failed(output));
                    }
                }
            }
            output.push_str(&format!("History: {}", instance.history().join(" → ")));
            Ok(Output::ok(output))
        }
    }
}

/// Reads a document from a file, or stdin for "-".
fn read_input(input: &str) -> Result<String, std::io::Error> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(Path::new(input))
    }
}

fn format_diagnostics(label: &str, errors: &[Diagnostic]) -> String {
    let mut output = format!("{} {}\n", "error".red(), label);
    for error in errors {
        output.push_str(&format!("  {}\n", error));
    }
    output
}

fn format_schema(schema: &PrimitiveSchema) -> String {
    let mut output = String::new();
    for (name, spec) in &schema.attributes {
        let mut line = format!("  {}: {}", name, spec.value_type);
        if spec.required {
            line.push_str(" (required)");
        }
        if let Some(default) = &spec.default {
            line.push_str(&format!(" = {}", default));
        }
        output.push_str(&line);
        output.push('\n');
    }
    if !schema.states.is_empty() {
        output.push_str(&format!("  states: {}\n", schema.states.join(", ").dimmed()));
    }
    output
}
