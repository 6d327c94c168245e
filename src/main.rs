use shopassist::assistant::format_vnd;
use shopassist::catalog::{normalize::Normalizer, JsonCatalog};
use shopassist::cli::{CatalogAction, Cli, Commands, ConfigAction};
use shopassist::config::{expand_path, Config, ConfigValidator};
use shopassist::error::{AssistError, Result};
use shopassist::memory::{SqliteThreadStore, ThreadStore};
use shopassist::{ShopAssistant, TurnResponse};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Chat {
            thread,
            message,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            block_on(cmd_chat(config, thread, message, json))?;
        }
        Commands::Search {
            query,
            limit,
            no_rerank,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            block_on(cmd_search(config, &query, limit, no_rerank, json))?;
        }
        Commands::History { thread_id, json } => {
            let config = load_config(cli.config, cli.profile)?;
            block_on(cmd_history(config, thread_id, json))?;
        }
        Commands::Catalog { action } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_catalog(config, action)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "shopassist=debug" } else { "shopassist=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| AssistError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    rt.block_on(future)
}

async fn cmd_chat(config: Config, thread: Option<String>, message: Option<String>, json: bool) -> Result<()> {
    let assistant = ShopAssistant::from_config(&config).await?;

    if let Some(message) = message {
        let turn = assistant.handle_turn(thread, &message).await?;
        print_turn(&turn, json)?;
        return Ok(());
    }

    println!("{} is ready. Type a message, or 'exit' to quit.", config.assistant.persona_name);
    let mut thread_id = thread;
    let stdin = std::io::stdin();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| AssistError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        let line = line.trim();
        if read == 0 || line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }

        match assistant.handle_turn(thread_id.clone(), line).await {
            Ok(turn) => {
                thread_id = Some(turn.thread_id.clone());
                print_turn(&turn, json)?;
            }
            Err(e) => {
                eprintln!("✗ {} ({})", e, e.kind());
                if e.is_retryable() {
                    eprintln!("  Temporary failure; send the message again to retry.");
                }
            }
        }
    }

    if let Some(id) = thread_id {
        println!("Thread: {}", id);
    }
    Ok(())
}

fn print_turn(turn: &TurnResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(turn)?);
        return Ok(());
    }

    println!("\n{}\n", turn.response);
    if !turn.products.is_empty() {
        println!("Products:");
        for product in &turn.products {
            println!("  - {} ({})", product.document.title(), product.document.metadata.url);
        }
    }
    for notice in &turn.notices {
        println!("⚠ {}", notice);
    }
    println!("[thread {} | {}]", turn.thread_id, turn.route.label());
    Ok(())
}

async fn cmd_search(config: Config, query: &str, limit: usize, no_rerank: bool, json: bool) -> Result<()> {
    let assistant = ShopAssistant::from_config(&config).await?;
    let outcome = assistant.search(query, limit, !no_rerank).await?;

    if json {
        let results: Vec<_> = outcome.candidates.iter().collect();
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if outcome.candidates.is_empty() {
        println!("No matching products.");
    }
    for (rank, candidate) in outcome.candidates.iter().enumerate() {
        let price = candidate
            .document
            .metadata
            .price
            .map(format_vnd)
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:>2}. [{:.4} {}] {} - {}",
            rank + 1,
            candidate.score,
            candidate.source,
            candidate.document.title(),
            price
        );
        println!("    {}", candidate.preview(120));
    }
    for notice in &outcome.notices {
        println!("⚠ {}", notice);
    }
    Ok(())
}

async fn cmd_history(config: Config, thread_id: Option<String>, json: bool) -> Result<()> {
    let store = SqliteThreadStore::open(&config.threads_db_path()?)?;

    let Some(thread_id) = thread_id else {
        let threads = store.recent_threads(20)?;
        println!("Threads: {} total", store.thread_count()?);
        for (id, updated_at) in threads {
            println!("  {} ({})", id, updated_at.format("%Y-%m-%d %H:%M:%S"));
        }
        return Ok(());
    };

    let thread = store
        .get(&thread_id)
        .await
        .map_err(|e| AssistError::MemoryStoreUnavailable(e.to_string()))?;

    let Some(thread) = thread else {
        println!("No thread with id {}", thread_id);
        return Ok(());
    };

    if json {
        println!("{}", to_json(&thread)?);
        return Ok(());
    }

    println!("Thread {} (updated {})", thread.thread_id, thread.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(summary) = &thread.summary {
        println!("\nSummary:\n  {}", summary);
    }
    println!();
    for message in &thread.messages {
        println!("[{}] {}: {}", message.timestamp.format("%H:%M:%S"), message.role.as_str(), message.content);
    }
    Ok(())
}

fn cmd_catalog(config: Config, action: CatalogAction) -> Result<()> {
    match action {
        CatalogAction::Normalize { input, output } => {
            let normalizer = Normalizer::with_defaults()?;
            let count = normalizer.normalize_file(&input, &output)?;
            println!("✓ Normalized {} products into {}", count, output.display());
        }
        CatalogAction::Stats => {
            let catalog = JsonCatalog::new(expand_path(&config.catalog.path)?);
            let products = catalog.load_products()?;

            let mut brands: BTreeMap<&str, usize> = BTreeMap::new();
            for product in &products {
                let brand = if product.brand.is_empty() { "(none)" } else { product.brand.as_str() };
                *brands.entry(brand).or_default() += 1;
            }

            println!("Catalog: {}", catalog.path().display());
            println!("  Products: {}", products.len());
            println!("  With price: {}", products.iter().filter(|p| p.price.is_some()).count());
            println!("  With URL: {}", products.iter().filter(|p| !p.url.is_empty()).count());
            println!("\nBrands:");
            for (brand, count) in brands {
                println!("  {}: {}", brand, count);
            }
        }
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| AssistError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found at {}, using defaults. Run 'shopassist config init' to create one.",
            path.display()
        );
        let mut config = Config::default();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| AssistError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
