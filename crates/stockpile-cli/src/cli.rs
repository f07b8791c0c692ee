use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stockpile_core::EntityKind;

#[derive(Parser)]
#[command(name = "stockpile")]
#[command(about = "Offline-first inventory tracking from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an entity in the local store
    #[command(alias = "new")]
    Add {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Display name
        name: Vec<String>,
        /// Natural key (scanned code)
        #[arg(long)]
        code: Option<String>,
        /// Parent container/location (ID, code, or ID prefix)
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
        /// Category (ID, code, or ID prefix)
        #[arg(long, value_name = "ID")]
        category: Option<String>,
        /// Stock count
        #[arg(short, long, default_value = "0")]
        quantity: i64,
        /// Unit price in cents
        #[arg(long)]
        price_cents: Option<i64>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List entities of a kind, most recently updated first
    List {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Number of entities to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change scalar fields of an entity
    Set {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Entity ID, code, or unique ID prefix
        id: String,
        /// New display name
        #[arg(long)]
        name: Option<String>,
        /// New code (empty string clears it)
        #[arg(long)]
        code: Option<String>,
        /// New category (empty string clears it)
        #[arg(long, value_name = "ID")]
        category: Option<String>,
        /// New stock count
        #[arg(short, long)]
        quantity: Option<i64>,
        /// New unit price in cents
        #[arg(long)]
        price_cents: Option<i64>,
        /// New notes (empty string clears them)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Move an entity under a new parent
    Move {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Entity ID, code, or unique ID prefix
        id: String,
        /// New parent (ID, code, or ID prefix)
        #[arg(long, value_name = "ID")]
        to: Option<String>,
        /// Move to the top level instead
        #[arg(long, conflicts_with = "to")]
        to_root: bool,
    },
    /// Delete an entity
    Delete {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Entity ID, code, or unique ID prefix
        id: String,
    },
    /// Look up an entity by its scanned code, falling back to the remote
    Lookup {
        /// Entity kind
        #[arg(value_enum)]
        kind: KindArg,
        /// Scanned code
        code: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search entity names and codes
    Search {
        /// Search query
        query: String,
        /// Number of matches to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reconcile the local store with the remote backend
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Control the forced-offline switch
    Offline {
        #[command(subcommand)]
        command: OfflineCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run one sync pass (the default)
    Run,
    /// Show queue depth, failures, conflicts, and the last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List unresolved conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a conflict by keeping one side or merging fields
    Resolve {
        /// Conflict ID or unique ID prefix
        id: String,
        /// Which side wins
        #[arg(value_enum)]
        strategy: StrategyArg,
        /// Per-field side for merge, e.g. --take name=local --take quantity=remote
        #[arg(long = "take", value_name = "FIELD=SIDE")]
        take: Vec<String>,
    },
    /// Put failed events back in the queue
    Retry {
        /// Failed event ID or unique ID prefix
        id: Option<String>,
        /// Retry every failed event
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

#[derive(Subcommand)]
pub enum OfflineCommands {
    /// Force the app offline; sync passes are skipped
    On,
    /// Clear the forced-offline switch
    Off,
    /// Show the current switch state
    Status,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Item,
    Container,
    Category,
    Location,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Item => Self::Item,
            KindArg::Container => Self::Container,
            KindArg::Category => Self::Category,
            KindArg::Location => Self::Location,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    /// Keep the local snapshot wholesale
    Local,
    /// Accept the remote snapshot wholesale
    Remote,
    /// Pick a side per diverging field via --take
    Merge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
