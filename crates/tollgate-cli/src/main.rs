use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tollgate_core::constants::tasks;
use tollgate_core::{
    FileSettingsStore, MemorySettingsStore, PricingSource, ProviderId, ProviderRouter, Settings,
    SettingsStore, SettingsUpdate,
};

mod commands;

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate - routed AI generation with a metered usage ledger")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Provider for this run only (openai, claude, gemini)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model for this run only
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate text from a prompt
    Ask {
        prompt: String,
        /// Task label used for routing overrides
        #[arg(short, long, default_value = tasks::CHAT)]
        task: String,
        /// Attach an image (repeatable)
        #[arg(short, long)]
        image: Vec<PathBuf>,
    },
    /// Describe an image with the default provider
    Analyze {
        image: PathBuf,
        #[arg(default_value = "Describe this image in detail.")]
        prompt: String,
    },
    /// Generate an image and print where it was saved
    Generate {
        prompt: String,
        /// Size as WIDTHxHEIGHT
        #[arg(short, long)]
        size: Option<String>,
        /// Reference image to edit from
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },
    /// Show the usage ledger for a day
    Usage {
        /// YYYY-MM-DD, `today` or `yesterday`
        #[arg(short, long, default_value = "today")]
        date: String,
        /// Print the raw ledger entry as JSON
        #[arg(long)]
        json: bool,
    },
    /// List models available to a provider account
    Models {
        /// Defaults to the configured provider
        provider: Option<String>,
    },
    /// Change persisted routing settings
    Config {
        /// Default provider
        #[arg(long)]
        set_provider: Option<String>,
        /// Default model
        #[arg(long)]
        set_model: Option<String>,
        /// Explicit image model (`none` clears it)
        #[arg(long)]
        image_model: Option<String>,
        /// task=provider[:model], or task= to clear (repeatable)
        #[arg(long = "route")]
        routes: Vec<String>,
    },
}

fn parse_provider(name: &str) -> Result<ProviderId> {
    name.parse().map_err(|e| anyhow!("{e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let file_store = match &cli.config {
        Some(path) => FileSettingsStore::new(path),
        None => FileSettingsStore::default_location(),
    };

    if let Command::Config {
        set_provider,
        set_model,
        image_model,
        routes,
    } = &cli.command
    {
        let mut update = SettingsUpdate {
            provider: set_provider.as_deref().map(parse_provider).transpose()?,
            model: set_model.clone(),
            image_model: image_model
                .as_deref()
                .map(|m| (m != "none").then(|| m.to_string())),
            ..Default::default()
        };
        for route in routes {
            let (task, target) = commands::parse_task_override(route).map_err(|e| anyhow!(e))?;
            update.task_overrides.insert(task, target);
        }
        let settings = file_store.update_settings(update)?;
        println!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    // Per-run overrides never touch the settings file.
    let mut settings: Settings = file_store.get_settings();
    if let Some(provider) = &cli.provider {
        let provider = parse_provider(provider)?;
        settings.llm.provider = provider;
        settings.llm.model = settings.provider_config(provider).default_model;
    }
    if let Some(model) = &cli.model {
        settings.llm.model = model.clone();
    }
    tracing::debug!(
        "Default route {} / {}",
        settings.llm.provider,
        settings.llm.model
    );

    let currency = commands::report_currency(&PricingSource::File(settings.pricing_path()));
    let router = ProviderRouter::from_store(Arc::new(MemorySettingsStore::new(settings.clone())));

    match cli.command {
        Command::Ask {
            prompt,
            task,
            image,
        } => {
            let mut images = Vec::with_capacity(image.len());
            for path in &image {
                images.push(tollgate_core::ImageBlob::from_path(path).await?);
            }
            println!("{}", router.ask(&prompt, &task, &images).await);
            if let Some(record) = router.last_usage() {
                eprintln!("{}", commands::format_last_usage(&record, &currency));
            }
        }
        Command::Analyze { image, prompt } => {
            println!("{}", router.analyze_image(&image, &prompt).await);
            if let Some(record) = router.last_usage() {
                eprintln!("{}", commands::format_last_usage(&record, &currency));
            }
        }
        Command::Generate {
            prompt,
            size,
            reference,
        } => {
            let outcome = router
                .generate_image(&prompt, size.as_deref(), reference.as_deref())
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.error().is_some() {
                std::process::exit(1);
            }
        }
        Command::Usage { date, json } => {
            let today = chrono::Local::now().date_naive();
            let date = commands::parse_date(&date, today).map_err(|e| anyhow!(e))?;
            let entry = router.ledger().usage_by_date(date)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                print!("{}", commands::format_usage(date, &entry, &currency));
            }
        }
        Command::Models { provider } => {
            let provider = match provider {
                Some(name) => parse_provider(&name)?,
                None => settings.llm.provider,
            };
            for model in router.list_models(provider).await? {
                println!("{model}");
            }
        }
        Command::Config { .. } => {}
    }

    Ok(())
}
