use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storyvoice", version, about = "Storybook narration generator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate narration for one book.
    Narrate(NarrateArgs),
    /// Generate narration for every book in the library.
    NarrateAll(NarrateAllArgs),
    /// Download a book's generated narration into the local cache.
    Preload(PreloadArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct NarrateArgs {
    #[arg(long)]
    pub book: String,
    /// Provider voice id to narrate with.
    #[arg(long)]
    pub voice: String,
    /// Saved voice-sample id to re-clone a temporary voice from.
    #[arg(long)]
    pub recloned_from: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct NarrateAllArgs {
    #[arg(long)]
    pub voice: String,
    #[arg(long)]
    pub recloned_from: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct PreloadArgs {
    #[arg(long)]
    pub book: String,
    /// Display language to preload narration for.
    #[arg(long)]
    pub language: String,
    /// Custom voice id; omit for the default voice.
    #[arg(long)]
    pub voice: Option<String>,
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}
