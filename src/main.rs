use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use text2typeql::batch::{BatchConverter, CancellationFlag, FailureSource, OutputStore};
use text2typeql::config::{self, ConverterConfig};
use text2typeql::drafting::llm::{HttpChatService, LlmConfig};
use text2typeql::drafting::prompt::PromptContext;
use text2typeql::drafting::{DraftStrategy, HybridDrafter, LlmDrafter, RuleBasedDrafter};
use text2typeql::mapping::MappingConfig;
use text2typeql::schema_conversion::{approve_schema, is_schema_approved, persist_schema, SchemaConverter};
use text2typeql::source_schema::{dataset, SourceSchema};
use text2typeql::validation::{
    EngineRecovery, NoRecovery, TypeDbHttpEngine, TypeDbServer, ValidationLoop, ValidationMode, Validator,
    Verdict, WorkItem,
};

/// text2typeql - converts text2cypher datasets into validated TypeQL datasets
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file (replaces environment configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TypeDB HTTP endpoint
    #[arg(long, global = true)]
    typedb_url: Option<String>,

    /// TypeDB server binary, started and restarted on demand
    #[arg(long, global = true)]
    typedb_binary: Option<PathBuf>,

    /// Root directory of per-database outputs
    #[arg(long, global = true)]
    dataset_dir: Option<PathBuf>,

    /// Directory of per-database mapping YAML files
    #[arg(long, global = true)]
    mappings_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DrafterKind {
    /// Deterministic translator only
    Rules,
    /// Text-completion service only
    Llm,
    /// Translator first, text-completion service for retries
    Hybrid,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RetrySource {
    Failed,
    FailedRetries,
}

impl From<RetrySource> for FailureSource {
    fn from(source: RetrySource) -> Self {
        match source {
            RetrySource::Failed => FailureSource::Failed,
            RetrySource::FailedRetries => FailureSource::FailedRetries,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// List the databases in the schemas CSV
    ListSchemas,

    /// Convert a Neo4j schema to TypeQL and validate it
    ConvertSchema { database: String },

    /// Mark a converted schema as reviewed
    ApproveSchema { database: String },

    /// Print the converted schema and its status
    ShowSchema { database: String },

    /// Translate one Cypher query with the rule-based translator
    Translate {
        database: String,
        cypher: String,
        /// Also execute the result in a scratch database
        #[arg(long)]
        validate: bool,
    },

    /// Convert a database's queries in resumable batches
    Convert {
        database: String,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        max_retries: Option<usize>,
        /// Only the first N valid queries
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        drafter: Option<DrafterKind>,
        /// Convert even if the schema has not been approved
        #[arg(long)]
        skip_approval: bool,
    },

    /// Re-process the failure stream in bounded rounds
    Retry {
        database: String,
        #[arg(long, value_enum)]
        source: Option<RetrySource>,
        #[arg(long)]
        rounds: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        drafter: Option<DrafterKind>,
    },

    /// Show conversion status for one or all databases
    Status { database: Option<String> },
}

impl Cli {
    fn cli_config(&self) -> config::CliConfig {
        let (batch_size, max_retries, rounds) = match &self.command {
            Command::Convert {
                batch_size,
                max_retries,
                ..
            } => (*batch_size, *max_retries, None),
            Command::Retry {
                batch_size, rounds, ..
            } => (*batch_size, None, *rounds),
            _ => (None, None, None),
        };
        config::CliConfig {
            config_file: self.config.clone(),
            typedb_url: self.typedb_url.clone(),
            typedb_binary: self.typedb_binary.clone(),
            max_retries,
            batch_size,
            max_retry_rounds: rounds,
            dataset_dir: self.dataset_dir.clone(),
            mappings_dir: self.mappings_dir.clone(),
        }
    }
}

struct Engine {
    client: Arc<TypeDbHttpEngine>,
    recovery: Arc<dyn EngineRecovery>,
}

async fn connect_engine(config: &ConverterConfig) -> anyhow::Result<Engine> {
    let client = Arc::new(TypeDbHttpEngine::new(
        &config.typedb_url,
        &config.typedb_username,
        &config.typedb_password,
    ));
    let recovery: Arc<dyn EngineRecovery> = match &config.typedb_binary {
        Some(binary) => {
            let server = TypeDbServer::new(
                binary,
                Duration::from_secs(config.engine_startup_wait_secs),
                client.clone(),
            );
            server.ensure_running().await.context("could not start TypeDB")?;
            Arc::new(server)
        }
        None => {
            if !client.ping().await {
                bail!("TypeDB is not reachable at {}", config.typedb_url);
            }
            Arc::new(NoRecovery)
        }
    };
    Ok(Engine { client, recovery })
}

fn load_source_schema(config: &ConverterConfig, database: &str) -> anyhow::Result<SourceSchema> {
    dataset::load_schema(&config.schemas_csv, database)
        .with_context(|| format!("loading schema for {} from {}", database, config.schemas_csv.display()))
}

fn load_mapping(config: &ConverterConfig, database: &str, kind: DrafterKind) -> anyhow::Result<MappingConfig> {
    match MappingConfig::load_for_database(&config.mappings_dir, database) {
        Ok(mapping) => Ok(mapping),
        Err(e) if matches!(kind, DrafterKind::Llm) => {
            log::debug!("No mapping for {} ({}); not needed by the LLM drafter", database, e);
            Ok(MappingConfig::new(database))
        }
        Err(e) => Err(e).context("rule-based drafting needs a mapping file"),
    }
}

fn build_drafter(
    kind: DrafterKind,
    mapping: MappingConfig,
    source: SourceSchema,
    typeql_schema: &str,
) -> anyhow::Result<Arc<dyn DraftStrategy>> {
    let source = Arc::new(source);
    let rules = RuleBasedDrafter::new(Arc::new(mapping)).with_schema(source.clone());
    let llm = || -> anyhow::Result<LlmDrafter> {
        let llm_config = LlmConfig::require_from_env()?;
        log::info!("Drafting with {:?} model {}", llm_config.provider, llm_config.model);
        let context = PromptContext {
            typeql_schema: typeql_schema.to_string(),
            neo4j_schema_json: source.to_json_pretty(),
        };
        Ok(LlmDrafter::new(Arc::new(HttpChatService::new(llm_config)), context))
    };
    let drafter: Arc<dyn DraftStrategy> = match kind {
        DrafterKind::Rules => Arc::new(rules),
        DrafterKind::Llm => Arc::new(llm()?),
        DrafterKind::Hybrid => Arc::new(HybridDrafter::new(rules, llm()?)),
    };
    Ok(drafter)
}

fn default_drafter(requested: Option<DrafterKind>) -> DrafterKind {
    requested.unwrap_or_else(|| {
        if LlmConfig::from_env().is_some() {
            DrafterKind::Hybrid
        } else {
            DrafterKind::Rules
        }
    })
}

fn spawn_ctrl_c(flag: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping after the current batch");
            flag.cancel();
        }
    });
}

/// Everything `convert` and `retry` share.
async fn batch_converter(
    config: &ConverterConfig,
    database: &str,
    drafter: Option<DrafterKind>,
    skip_approval: bool,
) -> anyhow::Result<BatchConverter> {
    let store = OutputStore::new(&config.dataset_dir, database);
    if !skip_approval && !is_schema_approved(&store)? {
        bail!(
            "schema for {} is not approved; run approve-schema or pass --skip-approval",
            database
        );
    }
    let Some(typeql_schema) = store.read_schema()? else {
        bail!("no converted schema for {}; run convert-schema first", database);
    };

    let kind = default_drafter(drafter);
    let source = load_source_schema(config, database)?;
    let mapping = load_mapping(config, database, kind)?;
    let drafter = build_drafter(kind, mapping, source, &typeql_schema)?;
    log::info!("Using the {} drafter", drafter.name());

    let engine = connect_engine(config).await?;
    let validator = Validator::new(
        engine.client,
        engine.recovery,
        typeql_schema,
        ValidationMode::Persistent {
            database: config.validation_database(database),
        },
    );
    let validation = ValidationLoop::new(drafter, Arc::new(validator), config.max_retries)
        .with_error_truncation(config.error_truncate_chars);

    let cancel = CancellationFlag::new();
    spawn_ctrl_c(cancel.clone());
    Ok(BatchConverter::new(database, store, validation, config.batch_size).with_cancellation(cancel))
}

async fn run(cli: Cli, config: ConverterConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::ListSchemas => {
            let schemas = dataset::load_schemas(&config.schemas_csv)?;
            for (name, schema) in &schemas {
                let rel_types: BTreeSet<&str> = schema.relationships.iter().map(|r| r.rel_type.as_str()).collect();
                println!(
                    "{:<24} {:>3} labels {:>3} relationship types",
                    name,
                    schema.node_properties.len(),
                    rel_types.len()
                );
            }
        }

        Command::ConvertSchema { database } => {
            let source = load_source_schema(&config, &database)?;
            let neo4j_json = source.to_json_pretty();
            let chat = Arc::new(HttpChatService::new(LlmConfig::require_from_env()?));
            let engine = connect_engine(&config).await?;
            let converter = SchemaConverter::new(chat, engine.client, &config.scratch_db_name, config.max_retries);
            let result = converter.convert(&neo4j_json).await?;

            let store = OutputStore::new(&config.dataset_dir, &database);
            persist_schema(&store, &database, &neo4j_json, &result)?;
            if result.success {
                println!(
                    "Schema for {} converted in {} attempt(s); review {} then run approve-schema",
                    database,
                    result.attempts,
                    store.path(text2typeql::batch::streams::SCHEMA_FILE).display()
                );
            } else {
                bail!(
                    "schema conversion for {} failed after {} attempts: {}",
                    database,
                    result.attempts,
                    result.errors.last().map(String::as_str).unwrap_or("unknown error")
                );
            }
        }

        Command::ApproveSchema { database } => {
            let store = OutputStore::new(&config.dataset_dir, &database);
            if !approve_schema(&store)? {
                bail!("no converted schema for {}; run convert-schema first", database);
            }
            println!("Schema for {} approved", database);
        }

        Command::ShowSchema { database } => {
            let store = OutputStore::new(&config.dataset_dir, &database);
            let Some(schema) = store.read_schema()? else {
                bail!("no converted schema for {}", database);
            };
            let approved = is_schema_approved(&store)?;
            println!("# {} ({})\n", database, if approved { "approved" } else { "not approved" });
            println!("{}", schema);
        }

        Command::Translate {
            database,
            cypher,
            validate,
        } => {
            let source = load_source_schema(&config, &database)?;
            let mapping = load_mapping(&config, &database, DrafterKind::Rules)?;
            let rules = RuleBasedDrafter::new(Arc::new(mapping)).with_schema(Arc::new(source));
            let typeql = rules.translate(&cypher)?;
            println!("{}", typeql);

            if validate {
                let store = OutputStore::new(&config.dataset_dir, &database);
                let Some(schema) = store.read_schema()? else {
                    bail!("no converted schema for {}; run convert-schema first", database);
                };
                let engine = connect_engine(&config).await?;
                let validator = Validator::new(
                    engine.client,
                    engine.recovery,
                    schema,
                    ValidationMode::SchemaOnly {
                        scratch_prefix: config.scratch_db_name.clone(),
                    },
                );
                match validator.validate_query(&typeql).await? {
                    Verdict::Accepted => println!("\nvalid"),
                    Verdict::Rejected(message) => bail!("TypeDB rejected the query: {}", message),
                }
            }
        }

        Command::Convert {
            database,
            limit,
            drafter,
            skip_approval,
            ..
        } => {
            let records = dataset::filter_valid(dataset::load_queries(&config.queries_csv, Some(&database))?);
            let items: Vec<WorkItem> = records
                .into_iter()
                .take(limit.unwrap_or(usize::MAX))
                .enumerate()
                .map(|(index, record)| WorkItem::new(index, record.question, record.cypher))
                .collect();
            if items.is_empty() {
                bail!("no valid queries for {} in {}", database, config.queries_csv.display());
            }
            log::info!("{} valid queries for {}", items.len(), database);

            let converter = batch_converter(&config, &database, drafter, skip_approval).await?;
            let summary = converter.run(&items).await?;
            println!(
                "Total: {}  Successful: {}  Failed: {}",
                summary.successful + summary.failed,
                summary.successful,
                summary.failed
            );
        }

        Command::Retry {
            database,
            source,
            drafter,
            ..
        } => {
            let converter = batch_converter(&config, &database, drafter, true).await?;
            let summary = converter
                .retry_failures(source.map(FailureSource::from), config.max_retry_rounds)
                .await?;
            println!(
                "Rounds: {}  Newly successful: {}  Still failed: {}",
                summary.rounds, summary.newly_successful, summary.still_failed
            );
        }

        Command::Status { database } => {
            let databases = match database {
                Some(db) => vec![db],
                None => list_output_dirs(&config.dataset_dir)?,
            };
            for db in databases {
                let store = OutputStore::new(&config.dataset_dir, &db);
                match store.load_status()? {
                    Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                    None => println!("{}: no status", db),
                }
                if let Some(progress) = store.load_progress()? {
                    println!(
                        "  checkpoint: next index {} of {}",
                        progress.next_index(),
                        progress.total_queries
                    );
                }
            }
        }
    }
    Ok(())
}

fn list_output_dirs(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[tokio::main]
async fn main() {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match ConverterConfig::from_cli(cli.cli_config()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
