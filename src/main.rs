//! leadpipe CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use leadpipe::{
    commands::{
        cmd_attach_table, cmd_create_collection, cmd_import, cmd_init, cmd_list_collections,
        cmd_list_tables, cmd_map_column, cmd_order, cmd_purchases, cmd_remove_table,
        cmd_show_table, cmd_status, cmd_tag_table, open_db, open_store, print_collections,
        print_import_outcome, print_order_outcome, print_purchases, print_status, print_table,
        print_table_completions, print_tables, ImportRequest, InitOptions, OrderRequest,
    },
    config::Config,
    dedup::DedupMode,
    error::{Error, Result},
    extract::parse_filters,
    progress::LogWriterFactory,
    reader::{Delimiter, DelimiterChoice, RaggedRows},
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "leadpipe")]
#[command(version, about = "Import, deduplicate and sell lead tables", long_about = None)]
struct Cli {
    /// Path to config file (or its directory)
    #[arg(short, long, global = true, env = "LEADPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize leadpipe configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Import a delimited file as a lead table
    Import {
        /// Path to the file
        path: PathBuf,

        /// Owner of the table
        #[arg(long)]
        owner: String,

        /// Table name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Delimiter: auto, comma, tab, semicolon, pipe
        #[arg(short, long)]
        delimiter: Option<DelimiterChoice>,

        /// Rows with the wrong field count: skip or pad
        #[arg(long, value_parser = parse_ragged)]
        ragged: Option<RaggedRows>,

        /// Dedup key columns (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        key: Vec<String>,

        /// Dedup mode: file, database, both
        #[arg(short, long)]
        mode: Option<DedupMode>,

        /// Tags for the table
        #[arg(long, value_delimiter = ',')]
        tag: Vec<String>,
    },

    /// Build an order from a collection
    Order {
        /// Buyer placing the order
        #[arg(long)]
        buyer: String,

        /// Collection ID or name
        #[arg(long)]
        collection: String,

        /// Maximum number of leads
        #[arg(short, long)]
        budget: usize,

        /// Filters as JSON, e.g. '{"state": {"type": "one_of", "values": ["CA"]}}'
        #[arg(short, long, conflicts_with = "filters_file")]
        filters: Option<String>,

        /// Read filters JSON from a file
        #[arg(long)]
        filters_file: Option<PathBuf>,

        /// Delimiter of the output file
        #[arg(long, default_value = "comma")]
        output_delimiter: Delimiter,
    },

    /// Manage lead tables
    Tables {
        #[command(subcommand)]
        action: TablesAction,
    },

    /// Manage collections
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Show what a buyer has purchased
    Purchases {
        /// Buyer
        #[arg(long)]
        buyer: String,

        /// Restrict to one collection (ID or name)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Show system status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TablesAction {
    /// List tables
    List {
        /// Only tables of this owner
        #[arg(long)]
        owner: Option<String>,

        /// Output only table IDs (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,

        /// Output table IDs with descriptions for shell completions
        #[arg(long, value_enum, hide = true)]
        completion: Option<Shell>,
    },

    /// Show one table
    Show {
        /// Table ID or name
        table: String,
    },

    /// Remove a table and its files
    Remove {
        /// Table ID or name
        table: String,
    },

    /// Replace a table's tags
    Tag {
        /// Table ID or name
        table: String,

        /// New tags
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// Create a collection
    Create {
        /// Collection name
        name: String,

        /// Owner of the collection
        #[arg(long)]
        owner: String,
    },

    /// List collections
    List,

    /// Attach a table to a collection
    Attach {
        /// Collection ID or name
        collection: String,

        /// Table ID or name
        table: String,
    },

    /// Map a logical column onto a table column
    Map {
        /// Collection ID or name
        collection: String,

        /// Logical column name
        logical: String,

        /// Table ID or name
        table: String,

        /// Column in the table
        physical: String,
    },
}

fn parse_ragged(s: &str) -> std::result::Result<RaggedRows, String> {
    match s.to_lowercase().as_str() {
        "skip" => Ok(RaggedRows::Skip),
        "pad" => Ok(RaggedRows::Pad),
        _ => Err(format!("expected 'skip' or 'pad', got '{}'", s)),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Init and completions don't need an existing config
    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config.as_deref(), force).await;
    }

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "leadpipe", &mut std::io::stdout());
        print_completion_extras(shell);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = open_db(&config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Import {
            path,
            owner,
            name,
            delimiter,
            ragged,
            key,
            mode,
            tag,
        } => {
            let name = match name {
                Some(name) => name,
                None => default_table_name(&path)?,
            };
            let request = ImportRequest {
                owner,
                name,
                source: path,
                delimiter,
                ragged_rows: ragged,
                key_columns: key,
                mode,
                tags: tag,
            };
            let show_progress = !json && std::io::stderr().is_terminal();
            let outcome =
                cmd_import(&config, &db, open_store(&config)?, request, show_progress).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_import_outcome(&outcome);
            }
        }

        Commands::Order {
            buyer,
            collection,
            budget,
            filters,
            filters_file,
            output_delimiter,
        } => {
            let filters_json = match (filters, filters_file) {
                (Some(json), _) => json,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => "{}".to_string(),
            };
            let request = OrderRequest {
                buyer,
                collection,
                filters: parse_filters(&filters_json)?,
                budget,
                output_delimiter,
            };
            let outcome = cmd_order(&config, &db, &db, open_store(&config)?, request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_order_outcome(&outcome);
            }
        }

        Commands::Tables { action } => match action {
            TablesAction::List {
                owner,
                ids_only,
                completion,
            } => {
                let tables = cmd_list_tables(&db, owner.as_deref()).await?;

                if let Some(shell) = completion {
                    print_table_completions(&tables, shell);
                } else if ids_only {
                    for table in &tables {
                        println!("{}", table.id);
                    }
                } else if json {
                    println!("{}", serde_json::to_string_pretty(&tables)?);
                } else {
                    print_tables(&tables);
                }
            }
            TablesAction::Show { table } => {
                let info = cmd_show_table(&db, &table).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    print_table(&info);
                }
            }
            TablesAction::Remove { table } => {
                let store = open_store(&config)?;
                let removed = cmd_remove_table(&db, store.as_ref(), &table).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&removed)?);
                } else {
                    println!("✓ Table '{}' removed ({})", removed.name, removed.id);
                }
            }
            TablesAction::Tag { table, tags } => {
                let updated = cmd_tag_table(&db, &table, tags).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&updated)?);
                } else {
                    println!("✓ Tagged '{}': {}", updated.name, updated.tags().join(", "));
                }
            }
        },

        Commands::Collections { action } => match action {
            CollectionsAction::Create { name, owner } => {
                let collection = cmd_create_collection(&db, &owner, &name).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&collection)?);
                } else {
                    println!("✓ Created collection '{}' ({})", collection.name, collection.id);
                }
            }
            CollectionsAction::List => {
                let collections = cmd_list_collections(&db).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&collections)?);
                } else {
                    print_collections(&collections);
                }
            }
            CollectionsAction::Attach { collection, table } => {
                cmd_attach_table(&db, &collection, &table).await?;
                if !json {
                    println!("✓ Attached '{}' to '{}'", table, collection);
                }
            }
            CollectionsAction::Map {
                collection,
                logical,
                table,
                physical,
            } => {
                cmd_map_column(&db, &collection, &logical, &table, &physical).await?;
                if !json {
                    println!("✓ Mapped {} -> {}.{}", logical, table, physical);
                }
            }
        },

        Commands::Purchases { buyer, collection } => {
            let summary = cmd_purchases(&db, &buyer, collection.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_purchases(&summary);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

fn default_table_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("Cannot derive a table name from {:?}", path)))
}

fn print_completion_extras(shell: Shell) {
    match shell {
        Shell::Zsh => {
            println!();
            println!("{}", r#"# Dynamic completion for table IDs"#);
            println!("{}", r#"_leadpipe_table_ids() {"#);
            println!("{}", r#"    local -a entries"#);
            println!(
                "{}",
                r#"    entries=("${(@f)$(leadpipe tables list --completion zsh 2>/dev/null)}")"#
            );
            println!("{}", r#"    _describe -t tables 'table ids' entries"#);
            println!("{}", r#"}"#);
        }
        Shell::Fish => {
            println!();
            println!("{}", r#"# Dynamic completion for table IDs"#);
            println!(
                "{}",
                r#"complete -c leadpipe -n '__fish_seen_subcommand_from show remove tag' -a '(leadpipe tables list --completion fish 2>/dev/null)'"#
            );
        }
        _ => {}
    }
}

async fn handle_init(path: Option<&Path>, force: bool) -> Result<()> {
    // A .toml path means "this config file"; anything else is the base dir
    let base_dir = path.map(|p| {
        if p.extension().is_some_and(|e| e == "toml") {
            p.parent().map(Path::to_path_buf).unwrap_or_else(Config::default_base_dir)
        } else {
            p.to_path_buf()
        }
    });

    let config = cmd_init(InitOptions { base_dir, force }).await?;

    println!("✓ leadpipe initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Blobs: {}", config.paths.blob_root.display());
    println!("\nNext steps:");
    println!("  1. Import a table: leadpipe import leads.csv --owner acme --key email");
    println!("  2. Create a collection: leadpipe collections create west --owner acme");
    println!("  3. Map columns: leadpipe collections map west State leads state");

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(p) => p.join("config.toml"),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
