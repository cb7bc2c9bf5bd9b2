use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::*;
use tracing_subscriber::EnvFilter;

use research_desk::backend::{HttpBackend, ResearchBackend};
use research_desk::cli::{Args, Command, SettingsAction};
use research_desk::config::{validate_model, ClientConfig};
use research_desk::controller::{Confirm, Phase, SessionController};
use research_desk::model::SettingsUpdate;
use research_desk::render::{render_history, render_progress, render_session, render_settings};
use research_desk::state::StateStore;
use research_desk::updates::PushListener;

/// Asks on stderr/stdin unless `--yes` was given.
struct TerminalConfirm {
    assume_yes: bool,
}

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{} [y/N] ", prompt.yellow());
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "research_desk=debug" } else { "research_desk=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Completions { shell } = &args.command {
        let mut cmd = Args::command();
        clap_complete::generate(*shell, &mut cmd, "research-desk", &mut io::stdout());
        return Ok(());
    }

    let mut cfg = ClientConfig::load(args.config.as_deref())?;
    args.apply_to(&mut cfg);
    let confirm = TerminalConfirm { assume_yes: args.yes };

    let backend: Arc<dyn ResearchBackend> = Arc::new(HttpBackend::from_config(&cfg));
    let state = match cfg.resolved_state_path() {
        Some(path) => StateStore::open(path),
        None => StateStore::in_memory(),
    };
    let mut controller = SessionController::new(Arc::clone(&backend), cfg.poll_interval()).with_state(state);

    match args.command {
        Command::Start { query, follow } => {
            attach_push(&mut controller, &cfg).await;
            let Some(chat_id) = controller.start_session(&query, &confirm).await? else {
                eprintln!("Nothing to research: the query is empty.");
                return Ok(());
            };
            println!("{} {}", "Research started:".bright_green(), chat_id);
            if follow {
                follow_session(&mut controller).await;
            } else {
                println!("Follow it with `research-desk watch {chat_id}`.");
            }
        }
        Command::Watch { id } => {
            let id = match id.or_else(|| controller.state().active_chat_id().map(str::to_string)) {
                Some(id) => id,
                None => {
                    eprintln!("No active chat to watch; pass a chat id.");
                    return Ok(());
                }
            };
            attach_push(&mut controller, &cfg).await;
            controller.load_session(&id, &confirm).await?;
            follow_session(&mut controller).await;
        }
        Command::Stop { id } => {
            controller.load_session(&id, &confirm).await?;
            if controller.stop_session().await? {
                println!("{} {}", "Research stopped:".yellow(), id);
            } else {
                println!("Chat {id} is not running.");
            }
        }
        Command::Show { id } => {
            controller.load_session(&id, &confirm).await?;
            if let Some(session) = controller.session() {
                print!("{}", render_session(session));
            }
        }
        Command::List => {
            let chats = controller.refresh_history().await?;
            print!("{}", render_history(chats));
        }
        Command::Settings { action } => {
            let settings = match action {
                Some(SettingsAction::Set { model }) => {
                    validate_model(&model)?;
                    let updated = backend
                        .update_settings(&SettingsUpdate { selected_model: model })
                        .await?;
                    println!("{}", "Model settings saved successfully".bright_green());
                    updated
                }
                None => backend.get_settings().await?,
            };
            print!("{}", render_settings(&settings));
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

/// Attach the push listener when configured and reachable.
async fn attach_push(controller: &mut SessionController, cfg: &ClientConfig) {
    let Some(url) = cfg.push_url.as_deref() else {
        return;
    };
    match PushListener::connect(url).await {
        Ok(listener) => {
            controller.attach_source(Box::new(listener));
            tracing::debug!(push = controller.has_push(), "update channels ready");
        }
        Err(e) => tracing::warn!(error = %e, "push channel unavailable, falling back to polling"),
    }
}

/// Print progress until the session settles or the user presses Ctrl+C.
/// Interrupting detaches; the research keeps running on the backend.
async fn follow_session(controller: &mut SessionController) {
    if controller.phase() == Phase::Active {
        if let Some(session) = controller.session() {
            println!("{}", render_progress(session));
        }
        let detached = tokio::select! {
            _ = controller.follow(|session, _| println!("{}", render_progress(session))) => false,
            _ = tokio::signal::ctrl_c() => true,
        };
        if detached {
            if let Some(id) = controller.current_id() {
                eprintln!("\nDetached. Research continues; resume with `research-desk watch {id}`.");
            }
            return;
        }
    }
    if let Some(session) = controller.session() {
        println!();
        print!("{}", render_session(session));
    }
}
