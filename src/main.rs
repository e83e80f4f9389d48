use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cms_store::{
    AttachmentStore, Collection, DefaultDataset, Filter, Query, SortOrder, Storage, StoreConfig,
    WorkingSet,
};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cms-store")]
#[command(about = "Inspect and edit a flat-file JSON content store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Content directory (defaults to CMS_CONTENT_DIR or the user data dir)
    #[arg(short, long, global = true)]
    content_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the content and backup directories
    Init,
    /// Print a collection as the working set sees it
    Show {
        collection: Collection,
    },
    /// List records of a collection with filters, sorting and paging
    List {
        collection: Collection,
        /// field=value, may be repeated
        #[arg(short, long)]
        filter: Vec<Filter>,
        /// Case-insensitive text search
        #[arg(short, long)]
        search: Option<String>,
        /// Field to sort by
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Replace a collection with the contents of a JSON file
    Put {
        collection: Collection,
        file: PathBuf,
    },
    /// List backups of a collection, newest first
    Backups {
        collection: Collection,
    },
    /// Restore a collection from its newest backup
    Restore {
        collection: Collection,
    },
    /// Store a PDF under the uploads directory
    Upload {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.content_dir {
        Some(dir) => StoreConfig::with_content_dir(dir),
        None => StoreConfig::from_env()?,
    };
    info!(content_dir = %config.content_dir.display(), "Using content directory");

    // Store calls do blocking file I/O.
    tokio::task::spawn_blocking(move || run(cli.command, config))
        .await
        .context("store task panicked")?
}

fn run(command: Commands, config: StoreConfig) -> anyhow::Result<()> {
    let storage = Storage::new(config.clone());

    match command {
        Commands::Init => {
            storage.ensure_directories()?;
            println!("Content directory ready: {}", config.content_dir.display());
        }
        Commands::Show { collection } => {
            let set = WorkingSet::init(storage, DefaultDataset::bundled())?;
            print_json(&set.snapshot(collection)?)?;
        }
        Commands::List {
            collection,
            filter,
            search,
            sort,
            desc,
            page,
            limit,
        } => {
            let set = WorkingSet::init(storage, DefaultDataset::bundled())?;
            let query = Query {
                filters: filter,
                search,
                sort_by: sort,
                order: if desc { SortOrder::Desc } else { SortOrder::Asc },
                page,
                limit,
            };
            print_json(&serde_json::to_value(set.query(collection, &query)?)?)?;
        }
        Commands::Put { collection, file } => {
            let data = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let value: Value = serde_json::from_str(&data)
                .with_context(|| format!("parsing {}", file.display()))?;
            let set = WorkingSet::init(storage, DefaultDataset::bundled())?;
            set.replace(collection, value)?;
            println!("Saved {collection}");
        }
        Commands::Backups { collection } => {
            for entry in storage.backups(collection)? {
                let modified: chrono::DateTime<chrono::Utc> = entry.modified.into();
                println!("{}  {}", modified.format("%Y-%m-%d %H:%M:%S"), entry.file_name());
            }
        }
        Commands::Restore { collection } => match storage.restore_latest(collection)? {
            Some(path) => println!("Restored {collection} from {}", path.display()),
            None => bail!("no backups found for {collection}"),
        },
        Commands::Upload { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stored = AttachmentStore::new(&config).store_pdf(&name, &bytes)?;
            print_json(&serde_json::to_value(&stored)?)?;
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
