//! routectl - CLI client for routed
//!
//! Routes messages, inspects decisions and manages the skill catalog
//! through the daemon's local HTTP API.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod client;
mod render;

use clap::{Parser, Subcommand};
use client::{Client, ClientError};
use route_core::skills::{parse_catalog_yaml, validate_definition, SEQUENCE_CATEGORY};
use std::path::{Path, PathBuf};

/// CLI client for the routed skill routing daemon.
#[derive(Parser)]
#[command(name = "routectl")]
#[command(about = "Control plane for the routed skill router")]
#[command(version)]
struct Cli {
    /// Daemon address (default: http://127.0.0.1:7700)
    #[arg(long, global = true, env = "ROUTED_ADDR")]
    addr: Option<String>,

    /// Auth token for daemon API
    #[arg(long, global = true, env = "ROUTED_TOKEN")]
    token: Option<String>,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Route a message to a sequence or skill
    Route {
        /// The user message
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// User the decision is logged under
        #[arg(long)]
        user: Option<String>,
    },

    /// Show similarity-ranked skills for a query
    Semantic {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Minimum similarity (0-1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum matches
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage the skill catalog
    Skills {
        #[command(subcommand)]
        command: SkillsCommand,
    },

    /// Replace the skills a sequence orchestrates
    Link {
        /// Sequence key
        sequence: String,

        /// Linked skill keys, in order
        skills: Vec<String>,
    },

    /// Show recent routing decisions
    Decisions {
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        user: Option<String>,
    },

    /// Show routing counters
    Metrics,
}

#[derive(Subcommand)]
enum SkillsCommand {
    /// List skills
    List {
        #[arg(long)]
        category: Option<String>,

        /// Only active skills
        #[arg(long, conflicts_with = "inactive")]
        active: bool,

        /// Only inactive skills
        #[arg(long)]
        inactive: bool,
    },

    /// Show one skill
    Show { key: String },

    /// Upload definitions from a YAML catalog file
    Import { file: PathBuf },

    /// Activate a skill
    Enable { key: String },

    /// Deactivate a skill
    Disable { key: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let addr = cli
        .addr
        .unwrap_or_else(|| "http://127.0.0.1:7700".to_string());
    let client = Client::new(&addr, cli.token.as_deref());

    // Wait for daemon to be ready: 5s total, starting at 200ms backoff.
    if let Err(e) = client.wait_for_ready().await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    let json = cli.json;
    let result = match cli.command {
        Command::Route { message, user } => {
            run_route(&client, &message.join(" "), user.as_deref(), json).await
        }
        Command::Semantic {
            query,
            threshold,
            limit,
        } => run_semantic(&client, &query.join(" "), threshold, limit, json).await,
        Command::Skills { command } => match command {
            SkillsCommand::List {
                category,
                active,
                inactive,
            } => {
                let filter = match (active, inactive) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                run_skills_list(&client, category.as_deref(), filter, json).await
            }
            SkillsCommand::Show { key } => run_skills_show(&client, &key, json).await,
            SkillsCommand::Import { file } => run_skills_import(&client, &file).await,
            SkillsCommand::Enable { key } => run_set_active(&client, &key, true).await,
            SkillsCommand::Disable { key } => run_set_active(&client, &key, false).await,
        },
        Command::Link { sequence, skills } => run_link(&client, &sequence, &skills).await,
        Command::Decisions { limit, user } => {
            run_decisions(&client, limit, user.as_deref(), json).await
        }
        Command::Metrics => run_metrics(&client, json).await,
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ClientError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

async fn run_route(
    client: &Client,
    message: &str,
    user: Option<&str>,
    json: bool,
) -> Result<(), ClientError> {
    let decision = client.route(message, user).await?;
    if json {
        return print_json(&decision);
    }
    render::print_decision(&decision);
    Ok(())
}

async fn run_semantic(
    client: &Client,
    query: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
    json: bool,
) -> Result<(), ClientError> {
    let matches = client.semantic(query, threshold, limit).await?;
    if json {
        return print_json(&matches);
    }
    render::print_semantic_matches(&matches);
    Ok(())
}

async fn run_skills_list(
    client: &Client,
    category: Option<&str>,
    active: Option<bool>,
    json: bool,
) -> Result<(), ClientError> {
    let skills = client.list_skills(category, active).await?;
    if json {
        return print_json(&skills);
    }
    render::print_skill_list(&skills);
    Ok(())
}

async fn run_skills_show(client: &Client, key: &str, json: bool) -> Result<(), ClientError> {
    let response = client.get_skill(key).await?;
    if json {
        return print_json(&response.skill);
    }
    render::print_skill_details(&response.skill, &response.linked_skills);
    Ok(())
}

/// Validate every definition locally, then upload them in file order.
async fn run_skills_import(client: &Client, file: &Path) -> Result<(), ClientError> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| ClientError::IoError(format!("{}: {}", file.display(), e)))?;
    let definitions =
        parse_catalog_yaml(&content).map_err(|e| ClientError::BadRequest(e.to_string()))?;
    for def in &definitions {
        validate_definition(def, SEQUENCE_CATEGORY)
            .map_err(|e| ClientError::BadRequest(format!("{}: {}", def.key, e)))?;
    }

    for def in &definitions {
        let response = client.upsert_skill(def).await?;
        println!("Imported: {} ({})", response.skill.key, response.skill.id);
    }
    println!("{} skill(s) imported", definitions.len());
    Ok(())
}

async fn run_set_active(client: &Client, key: &str, active: bool) -> Result<(), ClientError> {
    let skill = client.set_active(key, active).await?;
    let state = if skill.is_active { "enabled" } else { "disabled" };
    println!("Skill {} {}", skill.key, state);
    Ok(())
}

async fn run_link(client: &Client, sequence: &str, skills: &[String]) -> Result<(), ClientError> {
    let response = client.set_links(sequence, skills).await?;
    println!(
        "Sequence {} now links {} skill(s)",
        response.skill.key,
        response.linked_skills.len()
    );
    for (i, key) in response.linked_skills.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }
    Ok(())
}

async fn run_decisions(
    client: &Client,
    limit: Option<u32>,
    user: Option<&str>,
    json: bool,
) -> Result<(), ClientError> {
    let decisions = client.list_decisions(limit, user).await?;
    if json {
        return print_json(&decisions);
    }
    render::print_decision_list(&decisions);
    Ok(())
}

async fn run_metrics(client: &Client, json: bool) -> Result<(), ClientError> {
    let metrics = client.metrics().await?;
    if json {
        return print_json(&metrics);
    }
    render::print_metrics(&metrics);
    Ok(())
}
