use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Recorded inbound events, one JSON object per line (`{"event": ..., "data": ...}`).
    #[arg(long)]
    pub input: PathBuf,

    /// Output HTML file.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Also write every view update as JSON Lines to this path.
    #[arg(long)]
    pub patches: Option<PathBuf>,

    /// Forum id of the reader the feed is rendered for.
    #[arg(long, default_value_t = 0)]
    pub user_id: i64,

    /// Display name of the reader.
    #[arg(long, default_value = "reader")]
    pub user_name: String,

    /// Avatar URL of the reader.
    #[arg(long, default_value = "")]
    pub avatar_url: String,

    /// Posts kept while only the newest window is shown.
    #[arg(long, default_value_t = 50)]
    pub max_visible: usize,

    /// Posts requested per "load older" page.
    #[arg(long, default_value_t = 10)]
    pub page_size: u64,

    /// Reference time for relative timestamps (RFC 3339). Defaults to the current time.
    #[arg(long)]
    pub now: Option<DateTime<Utc>>,

    /// Link this stylesheet instead of embedding the built-in one.
    #[arg(long)]
    pub css: Option<String>,

    /// Fail on the first malformed line instead of skipping it.
    #[arg(long)]
    pub strict: bool,
}
