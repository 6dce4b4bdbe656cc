//! UI utilities for the CLI

use colored::*;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, size},
};
use std::io::{self, IsTerminal, Write};

use ragpipe_core::{IndexingResult, Result};
use ragpipe_rag::AssembledContext;

const PROMPT: &str = "rag>";

/// Display startup banner
pub fn display_banner(model: &str, records: usize) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = std::cmp::min(60, terminal_width.saturating_sub(4)).max(30);
    let inner = banner_width - 2;

    let top_border = format!("┌{}┐", "─".repeat(inner));
    let bottom_border = format!("└{}┘", "─".repeat(inner));
    let empty_line = format!("│{}│", " ".repeat(inner));

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());

    let lines = [
        format!("ragpipe v{}", env!("CARGO_PKG_VERSION")),
        String::new(),
        format!("model:  {}", model),
        format!("chunks: {}", records),
    ];

    for line in &lines {
        if line.is_empty() {
            println!("{}", empty_line.blue());
            continue;
        }
        let pad = inner.saturating_sub(line.chars().count() + 2);
        println!("{}", format!("│  {}{}│", line, " ".repeat(pad)).blue());
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!(
        "{}",
        "Ask a question about your documents, 'help' for commands, 'exit' to quit".dimmed()
    );
    println!();
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask a question about the indexed documents", "<question>".green());
    println!("  {} - Show the passages used for the last answer", "sources".green());
    println!("  {} - Forget the conversation so far", "reset".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the application", "exit/quit".green());
    println!();
}

/// Summarise which passages grounded an answer
pub fn format_sources(context: &AssembledContext) -> String {
    if context.included_ids.is_empty() {
        return "No passages matched; the answer is ungrounded.".to_string();
    }

    let mut out = format!("Sources ({}):", context.included_ids.len());
    for id in &context.included_ids {
        out.push_str("\n  - ");
        out.push_str(id);
    }
    if !context.skipped.is_empty() {
        out.push_str(&format!("\n  ({} matches skipped)", context.skipped.len()));
    }
    out
}

pub fn print_sources(context: &AssembledContext) {
    println!("{}", format_sources(context).dimmed());
}

/// One-line summary of an ingestion run
pub fn format_indexing_result(result: &IndexingResult) -> String {
    format!(
        "Indexed {} documents ({} chunks, {} failed)",
        result.documents_indexed, result.chunks_indexed, result.chunks_failed
    )
}

pub fn print_indexing_result(result: &IndexingResult) {
    let summary = format_indexing_result(result);
    if result.chunks_failed == 0 {
        println!("{} {}", "✅".green(), summary);
    } else {
        println!("{} {}", "⚠️".yellow(), summary.yellow());
        for error in &result.errors {
            eprintln!("  {}", error.red());
        }
    }
}

/// Print an error line to stderr
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

fn redraw(input: &str) -> Result<()> {
    let prompt = PROMPT.green().bold();
    let blank = " ".repeat(input.chars().count() + 50);
    print!("\r{} {}  \r{} {}", prompt, blank, prompt, input);
    io::stdout().flush()?;
    Ok(())
}

/// Read one line of input with ↑/↓ history navigation.
///
/// Returns `None` on end of input (Ctrl-D, Ctrl-C or a closed pipe).
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(Some(input));
    }

    enable_raw_mode()?;
    let result = read_raw_line(history);
    disable_raw_mode()?;
    println!();
    result
}

fn read_raw_line(history: &mut Vec<String>) -> Result<Option<String>> {
    let mut input = String::new();
    let mut history_index: Option<usize> = None;

    print!("{} ", PROMPT.green().bold());
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };

        match key_event.code {
            KeyCode::Enter => {
                let line = input.trim().to_string();
                if !line.is_empty() {
                    history.push(line.clone());
                }
                return Ok(Some(line));
            }
            KeyCode::Char('c') | KeyCode::Char('d')
                if key_event.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Ok(None);
            }
            KeyCode::Char(c) => {
                input.push(c);
                redraw(&input)?;
            }
            KeyCode::Backspace => {
                if input.pop().is_some() {
                    redraw(&input)?;
                }
            }
            KeyCode::Up => {
                if !history.is_empty() {
                    let new_index = match history_index {
                        None => history.len() - 1,
                        Some(idx) if idx > 0 => idx - 1,
                        Some(idx) => idx,
                    };
                    history_index = Some(new_index);
                    input = history[new_index].clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if let Some(idx) = history_index {
                    if idx + 1 < history.len() {
                        history_index = Some(idx + 1);
                        input = history[idx + 1].clone();
                    } else {
                        history_index = None;
                        input.clear();
                    }
                    redraw(&input)?;
                }
            }
            KeyCode::Esc => {
                input.clear();
                history_index = None;
                redraw(&input)?;
            }
            _ => {}
        }
    }
}
