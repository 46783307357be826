use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Sync read books from a calibre-web library to AniList")]
pub struct Cli {
    /// Config file (default: ~/.calilist.yaml).
    #[arg(long, global = true, env = "CALILIST_CONFIG")]
    pub config: Option<String>,

    /// Enable debug logging (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Push reading progress from calibre-web to AniList.
    Sync(SyncArgs),
    /// Store an AniList access token in the config file.
    Login,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// calibre-web app.db location.
    #[arg(long, env = "CALILIST_APP_DB")]
    pub app_db: Option<String>,

    /// calibre metadata.db location.
    #[arg(long, env = "CALILIST_METADATA_DB")]
    pub metadata_db: Option<String>,

    /// Report intended changes without writing to AniList.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
