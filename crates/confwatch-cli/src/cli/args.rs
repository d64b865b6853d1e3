use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "confwatch",
    version,
    about = "Read, write and watch keys in an etcd v2 style configuration store"
)]
pub struct Cli {
    /// Store base URL (keys live under {endpoint}/v2/keys/)
    #[arg(long, global = true, env = "CONFWATCH_ETCD_URL")]
    pub endpoint: Option<String>,

    /// Per-request deadline in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// YAML settings file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a key
    Get(GetArgs),
    /// Write a key
    Set(SetArgs),
    /// Write a key only if it is still at the given index
    Cas(CasArgs),
    /// Create a directory
    Mkdir(MkdirArgs),
    /// Append a value to a directory under a generated, ordered key
    Add(AddArgs),
    /// Delete a key
    Rm(RmArgs),
    /// Print every change of a key
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Dotted key, e.g. app.db.host
    pub key: String,

    /// Also print the modification index
    #[arg(long)]
    pub index: bool,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Parser, Debug)]
pub struct CasArgs {
    pub key: String,
    pub value: String,

    /// Expected modification index; negative means "only if absent"
    #[arg(long, allow_hyphen_values = true)]
    pub index: i64,
}

#[derive(Parser, Debug)]
pub struct MkdirArgs {
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct AddArgs {
    pub dir: String,
    pub value: String,
}

#[derive(Parser, Debug)]
pub struct RmArgs {
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    pub key: String,

    /// Exit after this many changes
    #[arg(long)]
    pub count: Option<usize>,
}
