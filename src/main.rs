use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::{fs::File, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};

use session_levels::{
    api::{self, AppState},
    assistant::{compose_prompt, respond, Assistant, GeminiClient, OfflineAssistant},
    classifier::AssistantClassifier,
    compute,
    import::{extract_sheet_id, import_workbook},
    storage::FileStore,
    CalculatedLevels, DataSource, Gateway, NeuralRule, RuleBase, RuleDirection, RuleUnit,
};

#[derive(Parser, Debug)]
#[command(name = "session-levels")]
#[command(about = "Session pivot levels, supply/demand ladder and rule zones")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the persisted records
    #[arg(long, global = true, env = "SESSION_LEVELS_DATA_DIR", default_value = ".session-levels")]
    data_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the computed levels
    Levels {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Load session OHLC and zones from CSV exports
    Import {
        /// OHLC export (columns Session, Open, High, Low, Close)
        #[arg(long)]
        ohlc: PathBuf,

        /// Zones export (columns Level, Label, Type, Color)
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Data source to record (excel or google_sheet)
        #[arg(long, default_value = "excel")]
        source: DataSource,

        /// Google Sheet URL the export came from
        #[arg(long)]
        sheet_url: Option<String>,
    },

    /// Manage zone rules
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },

    /// Serve the JSON API
    Serve {
        /// Port to run the web server on
        #[arg(short, long, env = "PORT", default_value = "3000")]
        port: u16,
    },

    /// Ask the assistant about the current levels
    Chat {
        /// Message text
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum RuleAction {
    /// List stored rules
    List,

    /// Add an active rule
    Add {
        /// Display name, e.g. "Golden Pocket"
        name: String,

        /// Offset amount
        #[arg(long, allow_hyphen_values = true)]
        value: f64,

        /// Anchor: pivot1, pivot2 or average
        #[arg(long, default_value = "pivot2", value_parser = parse_lowercase::<RuleBase>)]
        base: RuleBase,

        /// percent or points
        #[arg(long, default_value = "percent", value_parser = parse_lowercase::<RuleUnit>)]
        unit: RuleUnit,

        /// add (above) or subtract (below)
        #[arg(long, default_value = "add", value_parser = parse_lowercase::<RuleDirection>)]
        direction: RuleDirection,

        #[arg(long, default_value = "#000")]
        color: String,
    },

    /// Flip a rule between active and inactive
    Toggle { id: String },

    /// Delete a rule
    Remove { id: String },
}

/// Parse a CLI value through the lowercase serde names of the rule enums
fn parse_lowercase<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("session_levels=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let gateway = Gateway::new(Arc::new(FileStore::new(args.data_dir.clone())));

    match args.command {
        Commands::Levels { json } => {
            let levels = compute(&gateway.load_session_data(), &gateway.load_rules());
            if json {
                println!("{}", serde_json::to_string_pretty(&levels)?);
            } else {
                print_levels(&levels);
            }
        }
        Commands::Import { ohlc, zones, source, sheet_url } => {
            run_import(&gateway, ohlc, zones, source, sheet_url)?;
        }
        Commands::Rules { action } => run_rules(&gateway, action)?,
        Commands::Serve { port } => run_server(gateway, port).await?,
        Commands::Chat { text } => {
            let levels = compute(&gateway.load_session_data(), &gateway.load_rules());
            let prompt = compose_prompt(
                &levels,
                &gateway.load_instruction_text(),
                &gateway.load_logic_rules(),
                &text,
            );
            let assistant = build_assistant();
            println!("{}", respond(assistant.as_ref(), &prompt).await);
        }
    }

    Ok(())
}

fn build_assistant() -> Arc<dyn Assistant> {
    match GeminiClient::from_env() {
        Ok(client) => {
            info!("Assistant model: {}", client.model());
            Arc::new(client)
        }
        Err(e) => {
            warn!("{:#}; chat replies will fall back", e);
            Arc::new(OfflineAssistant)
        }
    }
}

fn run_import(
    gateway: &Gateway,
    ohlc: PathBuf,
    zones: Option<PathBuf>,
    source: DataSource,
    sheet_url: Option<String>,
) -> Result<()> {
    let ohlc_file = File::open(&ohlc).with_context(|| format!("Failed to open {}", ohlc.display()))?;
    let zones_file = zones
        .as_ref()
        .map(|path| File::open(path).with_context(|| format!("Failed to open {}", path.display())))
        .transpose()?;

    let mut data = import_workbook(Some(ohlc_file), zones_file, &gateway.load_session_data(), source)
        .context("Import rejected")?;

    if let Some(url) = sheet_url {
        match extract_sheet_id(&url) {
            Some(id) => data.google_sheet_id = id,
            None => bail!("Not a sheet URL: {}", url),
        }
    }

    gateway.save_session_data(&data);
    print_levels(&compute(&data, &gateway.load_rules()));
    Ok(())
}

fn run_rules(gateway: &Gateway, action: RuleAction) -> Result<()> {
    let mut rules = gateway.load_rules();

    match action {
        RuleAction::List => {
            if rules.is_empty() {
                println!("No rules");
            }
            for rule in &rules {
                let sign = match rule.direction {
                    RuleDirection::Add => '+',
                    RuleDirection::Subtract => '-',
                };
                let unit = match rule.unit {
                    RuleUnit::Percent => "%",
                    RuleUnit::Points => " pts",
                };
                println!(
                    "{} [{}] {} ({:?} {}{}{})",
                    rule.id,
                    if rule.is_active { "on " } else { "off" },
                    rule.name,
                    rule.base,
                    sign,
                    rule.value,
                    unit
                );
            }
            return Ok(());
        }
        RuleAction::Add { name, value, base, unit, direction, color } => {
            if !value.is_finite() {
                bail!("Rule value must be a finite number");
            }
            let rule = NeuralRule::new(name, base, value, unit, direction, color);
            println!("{}", rule.id);
            rules.push(rule);
        }
        RuleAction::Toggle { id } => {
            let rule = rules
                .iter_mut()
                .find(|r| r.id == id)
                .with_context(|| format!("No rule with id {}", id))?;
            rule.is_active = !rule.is_active;
            println!("{} is now {}", rule.name, if rule.is_active { "active" } else { "inactive" });
        }
        RuleAction::Remove { id } => {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            if rules.len() == before {
                bail!("No rule with id {}", id);
            }
        }
    }

    gateway.save_rules(&rules);
    Ok(())
}

async fn run_server(gateway: Gateway, port: u16) -> Result<()> {
    let assistant = build_assistant();
    let classifier = Arc::new(AssistantClassifier::new(assistant.clone()));
    let state = Arc::new(AppState::new(gateway, assistant, classifier));

    let app = api::router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_levels(levels: &CalculatedLevels) {
    println!("Pivot 1: {:>10.2}", levels.pivot1);
    println!("Pivot 2: {:>10.2}", levels.pivot2);
    println!("Bias:    {:>10}", levels.bias.to_string());
    println!();
    for zone in &levels.all_zones_sorted {
        println!(
            "{:>10.2}  {:<7} {}",
            zone.level,
            zone.zone_type.to_string(),
            zone.label.as_deref().unwrap_or_default()
        );
    }
    println!("\nUpdated {}", levels.last_updated);
}
