//! Initialize a language from the command line, printing per-file progress.
//!
//! Usage:
//!   cargo run --bin init-language -- <project> <lang>
//!   cargo run --bin init-language -- <project> <lang> --commit <sha> --coordinator <login>
//!
//! Required environment variables:
//! - GITHUB_TOKEN
//! - DEEPL_API_KEY
//!
//! Optional:
//! - PROJECTS_FILE (defaults to config/projects.json)
//!
//! On completion the language's `initializedAt` is stamped in PROJECTS_FILE and
//! an inactive language is switched to active.

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::info;
use translation_sync::config::Config;
use translation_sync::init::{
    FileState, InitOptions, LanguageInitializer, ProgressEvent, PROGRESS_CHANNEL_CAPACITY,
};
use translation_sync::server::AppState;

struct Args {
    project: String,
    lang: String,
    options: InitOptions,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut positional = Vec::new();
    let mut options = InitOptions::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--commit" => {
                options.commit = Some(iter.next().context("--commit needs a sha")?.clone());
            }
            "--coordinator" => {
                options.coordinator =
                    Some(iter.next().context("--coordinator needs a login")?.clone());
            }
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            value => positional.push(value.to_string()),
        }
    }

    match positional.as_slice() {
        [project, lang] => Ok(Args {
            project: project.clone(),
            lang: lang.clone(),
            options,
        }),
        _ => bail!("Usage: init-language <project> <lang> [--commit <sha>] [--coordinator <login>]"),
    }
}

fn print_event(event: &ProgressEvent) {
    let marker = match event.state {
        FileState::Pending => return,
        FileState::Translating => "…",
        FileState::Complete => "✓",
        FileState::Error => "✗",
    };
    match &event.message {
        Some(message) => println!(
            "{} [{}/{}] {}: {}",
            marker, event.index, event.total, event.file, message
        ),
        None => println!("{} [{}/{}] {}", marker, event.index, event.total, event.file),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_sync=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let config = Config::from_env()?;
    let state = AppState::new(config)?;
    let (project, language) = state
        .registry
        .initializable_language(&args.project, &args.lang)?;

    info!(
        "Initializing {} ({}) for {}/{}",
        language.name, args.lang, project.owner, project.repo
    );

    let (tx, mut rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = LanguageInitializer::new(
        &state.admin,
        &state.translator,
        &state.metadata,
        &state.config.github_web_url,
    )
    .with_progress(tx)
    .run(project, &args.lang, language, &args.options)
    .await;

    // The initializer owned the only sender, so the printer drains and exits.
    printer.await?;
    let result = result?;

    println!();
    println!(
        "{} of {} files translated from {}",
        result.files_processed, result.total_files, result.source_commit
    );
    println!("Branch: {}", result.branch_url);

    // The branch and metadata exist now, so record the language as initialized
    let mut registry = (*state.registry).clone();
    let initialized_at =
        registry.record_initialization(&args.project, &args.lang, result.initialized_at)?;
    registry.save_to_file(&state.config.projects_file)?;
    info!(
        "Recorded {}/{} as initialized at {} in {}",
        args.project, args.lang, initialized_at, state.config.projects_file
    );

    if !result.success {
        for error in &result.errors {
            eprintln!("  {}: {}", error.file, error.message);
        }
        bail!("{} file(s) failed to initialize", result.errors.len());
    }
    Ok(())
}
