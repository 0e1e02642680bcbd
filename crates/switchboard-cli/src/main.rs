//! # Switchboard CLI
//!
//! Command-line interface for Switchboard: one-shot flag evaluation
//! against the authoritative store, condition expression checking, and
//! corpus inspection.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use switchboard_core::{conditions, EvaluationContext, Evaluator, FlagId, Snapshot};
use switchboard_storage::{CorpusStore, Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about = "Switchboard CLI - Feature Flag Evaluation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a flag against the store
    Eval {
        /// Flag key or numeric id
        #[arg(short, long)]
        flag: String,
        /// Entity ID (omitted: anonymous bucketing)
        #[arg(short, long)]
        entity_id: Option<String>,
        /// Entity type
        #[arg(short = 't', long)]
        entity_type: Option<String>,
        /// Entity context as a JSON object
        #[arg(short, long, default_value = "{}")]
        context: String,
        /// Include the segment-by-segment debug trace
        #[arg(short, long)]
        debug: bool,
        /// Store URL
        #[arg(long, env = "SWITCHBOARD_DATABASE_URL")]
        database_url: String,
    },
    /// Check a condition expression
    Check {
        /// Condition source, e.g. '[tier] == "gold"'
        expression: String,
    },
    /// List the flags in the store
    Corpus {
        /// Store URL
        #[arg(long, env = "SWITCHBOARD_DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Eval {
            flag,
            entity_id,
            entity_type,
            context,
            debug,
            database_url,
        } => eval(flag, entity_id, entity_type, context, debug, database_url).await,
        Commands::Check { expression } => check(&expression),
        Commands::Corpus { database_url } => corpus(database_url).await,
    }
}

async fn load_snapshot(database_url: &str) -> anyhow::Result<Snapshot> {
    let db = Database::connect(&DatabaseConfig::from_url(database_url))
        .await
        .context("failed to connect to the store")?;
    let flags = db.load_all().await.context("failed to load the corpus")?;
    let snapshot = Snapshot::compile(flags, 1).context("failed to compile the corpus")?;
    for (flag_id, reason) in snapshot.rejected() {
        eprintln!("warning: flag {} excluded: {}", flag_id, reason);
    }
    Ok(snapshot)
}

async fn eval(
    flag: String,
    entity_id: Option<String>,
    entity_type: Option<String>,
    context: String,
    debug: bool,
    database_url: String,
) -> anyhow::Result<()> {
    let entity_context: serde_json::Value =
        serde_json::from_str(&context).context("entity context must be valid JSON")?;
    let serde_json::Value::Object(entity_context) = entity_context else {
        bail!("entity context must be a JSON object");
    };

    let snapshot = load_snapshot(&database_url).await?;
    let compiled = match flag.parse::<i64>() {
        Ok(id) => snapshot.flag_by_id(FlagId(id)),
        Err(_) => snapshot.flag_by_key(&flag),
    };
    let Some(compiled) = compiled else {
        bail!("flag not found: {}", flag);
    };

    let eval_context = EvaluationContext {
        entity_id,
        entity_type,
        entity_context,
    };
    let result = Evaluator::new().evaluate(&compiled, &eval_context, debug);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn check(expression: &str) -> anyhow::Result<()> {
    match conditions::parse(expression) {
        Ok(expr) => {
            println!("ok: {}", expr);
            let variables = expr.variables();
            if variables.is_empty() {
                println!("reads no attributes");
            } else {
                println!(
                    "reads: {}",
                    variables.into_iter().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(())
        },
        Err(err) => bail!("{}", err),
    }
}

async fn corpus(database_url: String) -> anyhow::Result<()> {
    let snapshot = load_snapshot(&database_url).await?;
    let mut flags: Vec<_> = snapshot.flags().collect();
    flags.sort_by_key(|flag| flag.id);
    for flag in flags {
        println!(
            "{:>6}  {:<24}  {}  {} segment(s), {} variant(s)",
            flag.id.to_string(),
            flag.key.as_deref().unwrap_or("-"),
            if flag.enabled { "enabled " } else { "disabled" },
            flag.segments.len(),
            flag.variants.len(),
        );
    }
    Ok(())
}
