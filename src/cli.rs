use clap::Parser;
use std::path::PathBuf;

/// Caption a batch of images with a vision chat model
#[derive(Debug, Parser)]
#[command(name = "captioner")]
#[command(version)]
#[command(about = "Caption a batch of images with a vision chat model", long_about = None)]
pub struct Args {
    /// Images to caption
    #[arg(value_name = "IMAGE", required = true)]
    pub images: Vec<PathBuf>,

    /// Caption rules, one per line
    #[arg(long = "rules", conflicts_with = "rules_file")]
    pub rules: Option<String>,

    /// Read caption rules from a file, one per line
    #[arg(long = "rules-file", value_name = "PATH")]
    pub rules_file: Option<PathBuf>,

    /// Concept or trigger sentence for the batch
    #[arg(long = "concept")]
    pub concept: Option<String>,

    /// API key (default: OPENAI_API_KEY or GEMINI_API_KEY, by provider)
    #[arg(long = "api-key")]
    pub api_key: Option<String>,

    /// Provider: openai, google or stub (default: config/provider or "openai")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Maximum requests in flight (default: config/concurrency or 4)
    #[arg(short = 'j', long = "concurrency", conflicts_with = "sequential")]
    pub concurrency: Option<usize>,

    /// Caption one image at a time, in order
    #[arg(long = "sequential")]
    pub sequential: bool,

    /// Existing caption for the image at the same position (repeatable)
    #[arg(long = "initial", value_name = "CAPTION")]
    pub initial: Vec<String>,

    /// Write each caption to a .txt file next to its image
    #[arg(long = "write-sidecars")]
    pub write_sidecars: bool,

    /// Print the final captions as JSON
    #[arg(long = "json")]
    pub json: bool,
}
