use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use imessage_foundry::config::AppConfig;
use imessage_foundry::db::{BuilderOptions, DatabaseBuilder};
use imessage_foundry::generator::{ConversationGenerator, GenerationProgress, GeneratorOptions};
use imessage_foundry::llm::{ProviderKind, ProviderManager};
use imessage_foundry::logging::{init_logging, OperationTimer};
use imessage_foundry::models::{ConversationConfig, PersonaConstraints, ServiceType};
use imessage_foundry::personas::{short_id, PersonaStore};
use imessage_foundry::schema::SchemaVersion;
use imessage_foundry::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Persona file (JSON or YAML)
    #[arg(long, global = true)]
    persona_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a conversation and write a chat.db file
    Generate {
        /// Comma-separated persona ids or id prefixes
        #[arg(short, long)]
        personas: String,

        /// Number of messages to generate
        #[arg(short, long)]
        count: Option<usize>,

        /// Output database path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Schema name (sonoma, sequoia, tahoe) or macOS version
        #[arg(long)]
        schema: Option<String>,

        /// Conversation topic or opening context
        #[arg(short, long)]
        seed: Option<String>,

        /// Time range in days, ending now
        #[arg(short, long)]
        days: Option<i64>,

        /// Messaging service (iMessage or SMS)
        #[arg(long)]
        service: Option<String>,

        /// LLM provider to use (local, openai, anthropic)
        #[arg(long)]
        provider: Option<String>,

        /// Seed for reproducible timestamps
        #[arg(long)]
        random_seed: Option<u64>,

        /// Build in memory and copy to the output path at the end
        #[arg(long)]
        in_memory: bool,
    },
    /// Show which LLM providers are usable
    Providers,
    /// Draft new personas with an LLM and add them to the persona file
    GeneratePersonas {
        /// Number of personas to draft
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Relationship to you (friend, coworker, sister, ...)
        #[arg(short, long)]
        relationship: Option<String>,

        /// Topics the personas should care about
        #[arg(short, long)]
        topics: Vec<String>,

        /// LLM provider to use (local, openai, anthropic)
        #[arg(long)]
        provider: Option<String>,

        /// Print the drafts without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// List personas in the persona file
    ListPersonas {
        /// Show every attribute
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_with(cli.config.as_deref())?;

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| config.get_log_level());
    let _log_guard = init_logging(Some(&level), config.logging.file_path.as_deref().map(Path::new))?;

    info!("Starting imessage-foundry");

    let persona_file = cli
        .persona_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.generation.persona_file));

    match cli.command {
        Commands::Generate {
            personas,
            count,
            output,
            schema,
            seed,
            days,
            service,
            provider,
            random_seed,
            in_memory,
        } => {
            let request = GenerateArgs {
                personas,
                count: count.unwrap_or(config.generation.message_count),
                output: output.unwrap_or_else(|| config.output_path()),
                schema: schema.map(|s| SchemaVersion::parse(&s)).or_else(|| config.schema_version()),
                seed,
                days: days.unwrap_or(config.generation.days),
                service: match service {
                    Some(s) => parse_arg::<ServiceType>(&s)?,
                    None => config.service().map_err(anyhow::Error::msg)?,
                },
                provider: provider.as_deref().map(parse_arg::<ProviderKind>).transpose()?,
                random_seed,
                in_memory: in_memory || config.database.in_memory,
            };
            generate(&config, &persona_file, request).await?;
        }
        Commands::Providers => list_providers(&config).await,
        Commands::GeneratePersonas {
            count,
            relationship,
            topics,
            provider,
            dry_run,
        } => {
            let provider = provider.as_deref().map(parse_arg::<ProviderKind>).transpose()?;
            let constraints = PersonaConstraints {
                relationship,
                topics,
                ..PersonaConstraints::default()
            };
            generate_personas(&config, &persona_file, count, constraints, provider, dry_run).await?;
        }
        Commands::ListPersonas { verbose } => list_personas(&persona_file, verbose)?,
    }

    Ok(())
}

fn parse_arg<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(anyhow::Error::msg)
}

struct GenerateArgs {
    personas: String,
    count: usize,
    output: PathBuf,
    schema: Option<SchemaVersion>,
    seed: Option<String>,
    days: i64,
    service: ServiceType,
    provider: Option<ProviderKind>,
    random_seed: Option<u64>,
    in_memory: bool,
}

/// Generate one conversation into a new database
async fn generate(config: &AppConfig, persona_file: &Path, args: GenerateArgs) -> Result<()> {
    let timer = OperationTimer::new("generate");

    let store = PersonaStore::load(persona_file)
        .with_context(|| format!("Failed to load personas from {}", persona_file.display()))?;
    let prefixes: Vec<&str> = args.personas.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let selected = store.select(&prefixes)?;
    InputValidator::validate_file_path(&args.output)?;

    let now = Utc::now();
    let mut conversation = ConversationConfig::new(
        selected.iter().map(|p| p.id.clone()).collect(),
        args.count,
        now - Duration::days(args.days),
        now,
    )
    .with_service(args.service);
    if let Some(seed) = &args.seed {
        conversation = conversation.with_seed(seed);
    }
    if let Some(random_seed) = args.random_seed {
        conversation = conversation.with_random_seed(random_seed);
    }

    // Fail on bad input before probing providers
    InputValidator::validate_conversation(&conversation, &selected)?;

    info!(
        personas = %selected.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "),
        messages = args.count,
        output = %args.output.display(),
        seed = args.seed.as_deref().unwrap_or("(none)"),
        "Generation settings"
    );

    let manager = ProviderManager::new(&config.llm);
    let provider = match manager.get_provider(args.provider).await {
        Ok(provider) => provider,
        Err(err) => {
            error!("No LLM provider available: {err}");
            return Err(err.into());
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            on_signal.cancel();
        }
    });

    let generator = ConversationGenerator::new(provider, GeneratorOptions::from(&config.llm)).with_cancellation(cancel);
    let mut builder = DatabaseBuilder::new(BuilderOptions {
        output_path: args.output,
        schema_version: args.schema,
        in_memory: args.in_memory,
    });

    let mut on_progress = |p: &GenerationProgress| {
        info!(
            phase = p.phase.as_str(),
            generated = p.generated_messages,
            total = p.total_messages,
            batch = p.current_batch,
            batches = p.total_batches,
            percent = %format!("{:.0}", p.percent_complete()),
            "Progress"
        );
    };
    let outcome = generator
        .generate_to_database(&selected, &conversation, &mut builder, Some(&mut on_progress))
        .await;
    let result = builder.finish_with(outcome)?;

    info!(
        messages = result.messages.len(),
        chat_id = result.chat_id,
        seconds = %format!("{:.1}", result.generation_time.as_secs_f64()),
        provider = %result.llm_provider_used,
        output = %builder.output_path().display(),
        "Generation complete"
    );
    timer.finish();
    Ok(())
}

/// Report availability of every provider
#[allow(clippy::print_stdout)]
async fn list_providers(config: &AppConfig) {
    let manager = ProviderManager::new(&config.llm);
    for (kind, name, available) in manager.list_available().await {
        let marker = if kind == manager.default_kind() { " (default)" } else { "" };
        if available {
            println!("  [ok] {name}{marker}");
        } else {
            println!("  [--] {name}{marker}: {}", ProviderManager::guidance(kind));
        }
    }
}

/// Draft personas with an LLM and store them
#[allow(clippy::print_stdout)]
async fn generate_personas(
    config: &AppConfig,
    persona_file: &Path,
    count: usize,
    constraints: PersonaConstraints,
    provider: Option<ProviderKind>,
    dry_run: bool,
) -> Result<()> {
    if count == 0 {
        return Err(anyhow::anyhow!("count must be greater than 0"));
    }
    let mut store = PersonaStore::load(persona_file)?;
    let provider = ProviderManager::new(&config.llm).get_provider(provider).await?;

    info!(count, provider = %provider.name(), "Drafting personas");
    let drafts = provider.generate_personas(Some(constraints), count).await?;

    let mut rng = rand::thread_rng();
    for draft in drafts {
        let identifier = format!("+1555{:07}", rng.gen_range(0..10_000_000));
        let persona = draft.into_persona(&identifier, false);
        println!("  {} - {} ({})", short_id(&persona.id), persona.name, persona.relationship);
        if !dry_run {
            store.add(persona)?;
        }
    }

    if !dry_run {
        store.save()?;
        info!(path = %store.path().display(), total = store.len(), "Personas saved");
    }
    Ok(())
}

/// Print personas from the persona file
#[allow(clippy::print_stdout)]
fn list_personas(persona_file: &Path, verbose: bool) -> Result<()> {
    let store = PersonaStore::load(persona_file)?;
    if store.is_empty() {
        println!("No personas in {}", persona_file.display());
        return Ok(());
    }

    for persona in store.list() {
        let marker = if persona.is_self { " (you)" } else { "" };
        println!("{} - {}{marker} <{}>", short_id(&persona.id), persona.name, persona.identifier);
        if verbose {
            println!("    relationship: {}", persona.relationship);
            println!("    personality: {}", persona.personality);
            println!("    writing style: {}", persona.writing_style);
            println!(
                "    frequency: {:?}, response: {:?}, emoji: {:?}, vocabulary: {:?}",
                persona.communication_frequency,
                persona.typical_response_time,
                persona.emoji_usage,
                persona.vocabulary_level
            );
            println!("    topics: {}", persona.topics_of_interest.join(", "));
        }
    }
    Ok(())
}
