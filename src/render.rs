//! Terminal rendering of sessions, history and settings.
//!
//! Functions return `String`s so the CLI decides where output goes.

use colored::*;

use crate::citations::{link_citations, split_sections, truncate_text, valid_reference_count, word_count, Block, Segment};
use crate::config::model_description;
use crate::model::{Analysis, ChatSummary, Reference, Session, SessionStatus, Settings};

const BAR_WIDTH: usize = 30;
const TITLE_MAX: usize = 40;
const HISTORY_MAX: usize = 25;
const URL_MAX: usize = 40;

/// `[#########.....................]  30%  message`
pub fn render_progress(session: &Session) -> String {
    let filled = (session.progress as usize * BAR_WIDTH) / 100;
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled));
    let bar = match session.status {
        SessionStatus::Completed => bar.bright_green(),
        SessionStatus::Stopped => bar.yellow(),
        _ => bar.bright_blue(),
    };
    format!("[{}] {:>3}%  {}", bar, session.progress, session.message)
}

fn render_status_line(session: &Session) -> String {
    match session.status {
        SessionStatus::Completed => "✔ Research completed".bright_green().bold().to_string(),
        SessionStatus::Stopped => "■ Research stopped".yellow().bold().to_string(),
        _ => format!("… {}", session.message).bright_blue().to_string(),
    }
}

/// Full view of one session: query, status, analysis and references.
pub fn render_session(session: &Session) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", truncate_text(&session.query, TITLE_MAX).bold()));
    out.push_str(&format!("{} {}\n", "Research Query:".dimmed(), session.query));
    out.push_str(&format!("{}\n", render_progress(session)));
    out.push_str(&format!("{}\n", render_status_line(session)));

    if session.status.is_running() && !session.search_queries.is_empty() {
        out.push_str(&format!("\n{}\n", "Search queries:".dimmed()));
        for q in &session.search_queries {
            out.push_str(&format!("  - {q}\n"));
        }
    }

    match &session.analysis {
        Analysis::Ready(text) => {
            out.push('\n');
            out.push_str(&render_analysis(text, &session.references));
        }
        Analysis::Unavailable => {
            out.push_str(&format!(
                "\n{}\n",
                "Analysis generation failed. Please try again.".red().bold()
            ));
        }
        Analysis::Pending => {}
    }

    out.push_str(&format!("\n{}\n", "References".bold()));
    if session.references.is_empty() && session.status.is_running() {
        out.push_str(&format!("{}\n", "Searching for references...".dimmed()));
    } else {
        out.push_str(&render_references(&session.references));
    }
    out
}

/// Analysis with headings, highlighted in-range citations and the
/// word / source counts.
pub fn render_analysis(analysis: &str, references: &[Reference]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", "Analysis Results".bold().underline()));
    out.push_str(&format!(
        "{}\n\n",
        format!(
            "Word count: {} words | References: {} sources",
            word_count(analysis),
            valid_reference_count(references)
        )
        .dimmed()
    ));

    for block in split_sections(analysis) {
        match block {
            Block::Heading(text) => out.push_str(&format!("{}\n\n", text.bold())),
            Block::Paragraph(text) => {
                for segment in link_citations(text, references) {
                    match segment {
                        Segment::Text(t) => out.push_str(t),
                        Segment::Citation { marker, .. } => {
                            out.push_str(&marker.bright_cyan().to_string())
                        }
                    }
                }
                out.push_str("\n\n");
            }
        }
    }
    out
}

/// `[n] title` followed by the (truncated) link or "URL not available".
pub fn render_references(references: &[Reference]) -> String {
    if references.is_empty() {
        return format!("{}\n", "No references available".dimmed().italic());
    }
    let mut out = String::new();
    for (i, reference) in references.iter().enumerate() {
        out.push_str(&format!("[{}] {}\n", i + 1, reference.display_title()));
        match reference.link() {
            Some(url) => out.push_str(&format!("    {}\n", truncate_text(url, URL_MAX).bright_blue().underline())),
            None => out.push_str(&format!("    {}\n", "URL not available".dimmed())),
        }
    }
    out
}

pub fn render_history(chats: &[ChatSummary]) -> String {
    if chats.is_empty() {
        return format!("{}\n", "No chat history".dimmed().italic());
    }
    let mut out = String::new();
    for chat in chats {
        let label = match chat.status {
            SessionStatus::Completed => chat.status.label().bright_green(),
            SessionStatus::Stopped => chat.status.label().yellow(),
            _ => chat.status.label().bright_blue(),
        };
        out.push_str(&format!(
            "{:<28} {:<12} {}\n",
            truncate_text(&chat.query, HISTORY_MAX),
            label,
            chat.id.dimmed()
        ));
    }
    out
}

pub fn render_settings(settings: &Settings) -> String {
    let mut out = format!("Selected model: {}\n", settings.selected_model.bold());
    if let Some(desc) = model_description(&settings.selected_model) {
        out.push_str(&format!("  {}\n", desc.dimmed()));
    }
    if !settings.available_models.is_empty() {
        out.push_str("Available models:\n");
        for model in &settings.available_models {
            let marker = if *model == settings.selected_model { "*" } else { " " };
            out.push_str(&format!(" {marker} {model}\n"));
        }
    }
    out
}
