use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use promptcrafter::config::save_model_name;
use promptcrafter::data::AppStateStore;
use promptcrafter::version::summarize_delta;
use promptcrafter::workbench::SendOutcome;
use promptcrafter::{
    migrate_version_graph, util, Config, Database, ModelClient, OllamaClient, PresetStore,
    ProjectBackend, ProjectStore, PromptPresetSummary, UuidGenerator, Workbench,
};
use tokio_util::sync::CancellationToken;

/// Craft prompts against a locally running language model.
#[derive(Parser, Debug)]
#[command(name = "promptcrafter", version, about, arg_required_else_help = true)]
struct Cli {
    /// Data directory (defaults to ~/.promptcrafter)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a description into a refined prompt and record it as a version
    Send {
        /// What the prompt should do
        text: String,
        /// Continue an existing project instead of starting a new one
        #[arg(long, value_name = "ID")]
        project: Option<String>,
        /// Preset id or name (defaults to the most recently used one)
        #[arg(long, value_name = "NAME")]
        preset: Option<String>,
    },
    /// List saved projects, most recent first
    Projects,
    /// Show the version history of a project
    History {
        project_id: String,
    },
    /// List models on the server, or pick the one to use
    Models {
        /// Model to save as the default
        #[arg(long, value_name = "NAME")]
        select: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.promptcrafter/logs/promptcrafter.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let config = Config::load();
    let db = Database::open_default()?;

    match cli.command {
        Command::Send {
            text,
            project,
            preset,
        } => send(&config, &db, text, project, preset).await,
        Command::Projects => list_projects(&db),
        Command::History { project_id } => show_history(&config, &db, &project_id),
        Command::Models { select } => models(&config, select).await,
    }
}

async fn send(
    config: &Config,
    db: &Database,
    text: String,
    project: Option<String>,
    preset: Option<String>,
) -> Result<()> {
    let presets = PresetStore::new(db.connection());
    let app_state = AppStateStore::new(db.connection());
    let mut workbench = Workbench::new(ProjectStore::new(db.connection()), config);

    let tab_id = match project {
        Some(project_id) => workbench.load_project(&project_id, &presets.list()?)?,
        None => {
            let preset = resolve_preset(&presets, &app_state, preset.as_deref())?;
            workbench.tabs_mut().create_tab(preset)?
        }
    };
    workbench.tabs_mut().update_draft(&tab_id, text);
    workbench.tabs_mut().mark_dirty(&tab_id, true);

    if let Some(tab) = workbench.tabs().tab(&tab_id) {
        if let Err(e) = app_state.record_recent_preset(tab.preset.recent_key()) {
            tracing::warn!(error = %e, "Failed to record recent preset");
        }
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let client = OllamaClient::from_config(&config.model);
    match workbench.send(&tab_id, &client, &cancel).await? {
        SendOutcome::Completed { message_id, .. } => {
            let tab = workbench
                .tabs()
                .tab(&tab_id)
                .ok_or_else(|| anyhow!("tab closed unexpectedly"))?;
            if let Some(reply) = tab.messages.iter().find(|m| m.id == message_id) {
                println!("{}", reply.content);
            }
            if let Some(project_id) = &tab.project_id {
                eprintln!(
                    "project {} · v{}",
                    project_id,
                    tab.version_graph.active_display_index()
                );
            }
            Ok(())
        }
        SendOutcome::Aborted => {
            eprintln!("Response aborted");
            Ok(())
        }
        SendOutcome::Failed(message) => bail!(message),
        SendOutcome::Discarded => bail!("tab closed before the response arrived"),
    }
}

fn resolve_preset(
    presets: &PresetStore,
    app_state: &AppStateStore,
    requested: Option<&str>,
) -> Result<PromptPresetSummary> {
    if let Some(key) = requested {
        return presets
            .find(key)?
            .with_context(|| format!("unknown preset: {}", key));
    }

    for key in app_state.recent_presets()? {
        if let Some(preset) = presets.find(&key)? {
            return Ok(preset);
        }
    }
    presets
        .list()?
        .into_iter()
        .next()
        .context("no presets available")
}

fn list_projects(db: &Database) -> Result<()> {
    let projects = ProjectStore::new(db.connection()).list()?;
    if projects.is_empty() {
        println!("No projects yet.");
        return Ok(());
    }

    for project in projects {
        println!(
            "{}  {}  {:>3} messages  {}",
            project.id,
            project.updated_at.format("%Y-%m-%d %H:%M"),
            project.message_count,
            project.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}

fn show_history(config: &Config, db: &Database, project_id: &str) -> Result<()> {
    let store = ProjectStore::new(db.connection());
    let loaded = store.load_project(project_id, config.history_limit)?;
    let graph = migrate_version_graph(loaded.version_graph.as_ref(), &loaded.messages, &UuidGenerator);

    let versions = graph.display_versions();
    if versions.is_empty() {
        println!("No versions recorded.");
        return Ok(());
    }

    let mut previous = None;
    for (index, version) in versions.iter().enumerate() {
        let marker = if version.id == graph.active_id() { "*" } else { " " };
        let output = if version.has_output() { "" } else { "  (no output)" };
        println!(
            "{} v{:<3} {:<20} {}{}",
            marker,
            index + 1,
            version.label,
            summarize_delta(version, previous),
            output
        );
        previous = Some(*version);
    }
    Ok(())
}

async fn models(config: &Config, select: Option<String>) -> Result<()> {
    if let Some(name) = select {
        save_model_name(&name).context("failed to update config file")?;
        println!("Using model {}", name);
        return Ok(());
    }

    let client = OllamaClient::from_config(&config.model);
    for model in client.list_models().await? {
        let marker = if model.name == config.model.name { "*" } else { " " };
        println!("{} {}", marker, model.name);
    }
    Ok(())
}
