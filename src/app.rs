use crate::captioner::{CaptionBatch, Captioner, Snapshot};
use crate::provider::{self, Provider};
use crate::settings::{AmbientConfig, CaptionSettings};
use crate::{cli, config, paths};
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_stream::StreamExt;

const DEFAULT_CONCURRENCY: usize = 4;

pub fn build_provider(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    provider_name: &str,
) -> anyhow::Result<Arc<dyn Provider + Send + Sync>> {
    match provider_name {
        "openai" => {
            #[cfg(feature = "openai")]
            {
                let base = cfg.and_then(|c| c.openai.api_base.as_deref());
                let p = provider::openai::OpenAiProvider::new(http.clone(), base)?;
                Ok(Arc::new(p))
            }
            #[cfg(not(feature = "openai"))]
            {
                let _ = (http, cfg);
                anyhow::bail!("openai provider is not enabled in this build")
            }
        }
        "google" => {
            #[cfg(feature = "google")]
            {
                let base = cfg.and_then(|c| c.google.api_base.as_deref());
                let p = provider::google::GoogleProvider::new(http.clone(), base)?;
                Ok(Arc::new(p))
            }
            #[cfg(not(feature = "google"))]
            {
                let _ = (http, cfg);
                anyhow::bail!("google provider is not enabled in this build")
            }
        }
        "stub" => Ok(Arc::new(provider::stub::StubProvider::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

pub fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        #[cfg(feature = "google")]
        "google" => provider::google::DEFAULT_MODEL,
        "stub" => "stub",
        #[cfg(feature = "openai")]
        _ => provider::openai::DEFAULT_MODEL,
        #[cfg(not(feature = "openai"))]
        _ => "gpt-4o",
    }
}

/// Placeholder captions padded with empty strings to one per image.
pub fn initial_slots(images: usize, mut initial: Vec<String>) -> anyhow::Result<Vec<String>> {
    if initial.len() > images {
        anyhow::bail!("{} initial captions given for {} images", initial.len(), images);
    }
    initial.resize(images, String::new());
    Ok(initial)
}

fn read_rules(args: &cli::Args, cfg: Option<&config::Config>) -> anyhow::Result<Option<String>> {
    if let Some(path) = &args.rules_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file: {}", path.display()))?;
        return Ok(Some(text));
    }
    Ok(args.rules.clone().or_else(|| cfg.and_then(|c| c.rules.clone())))
}

#[derive(Debug, Serialize)]
struct CaptionRecord<'a> {
    image: &'a Path,
    caption: &'a str,
}

pub async fn cmd_caption(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    ambient: &AmbientConfig,
    args: cli::Args,
) -> anyhow::Result<()> {
    let provider_name = args
        .provider
        .clone()
        .or_else(|| cfg.and_then(|c| c.provider.clone()))
        .unwrap_or_else(|| "openai".to_string());

    let model = args
        .model
        .clone()
        .or_else(|| cfg.and_then(|c| c.model.clone()))
        .unwrap_or_else(|| default_model(&provider_name).to_string());

    let concurrency = if args.sequential {
        1
    } else {
        args.concurrency
            .or_else(|| cfg.and_then(|c| c.concurrency))
            .unwrap_or(DEFAULT_CONCURRENCY)
    };

    let settings = CaptionSettings::new(ambient, &provider_name, read_rules(&args, cfg)?, args.api_key.clone());
    let provider = build_provider(http, cfg, &provider_name)?;
    let captioner = Captioner::new(provider, model, concurrency);

    let images = args.images;
    let initial = initial_slots(images.len(), args.initial)?;
    let sidecars = if args.write_sidecars {
        Some(paths::sidecar_paths(&images)?)
    } else {
        None
    };
    let batch = CaptionBatch {
        initial_slots: initial.clone(),
        images: images.clone(),
        topic_hint: args.concept,
        rules_text: settings.caption_rules().to_string(),
        credential: settings.credential().cloned(),
    };

    let mut snapshots = captioner.caption_batch(batch).await?;

    let mut progress: Box<dyn Write> = if args.json {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };

    let mut last = initial;
    let mut completed = 0;
    while let Some(item) = snapshots.next().await {
        let snapshot = item?;
        completed += 1;
        render_progress(&mut progress, &images, &snapshot, completed)?;
        last = snapshot.slots;
    }

    if let Some(sidecars) = &sidecars {
        write_sidecars(sidecars, &last)?;
    }

    if args.json {
        let records: Vec<_> = images
            .iter()
            .zip(&last)
            .map(|(image, caption)| CaptionRecord { image, caption })
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    }

    Ok(())
}

/// Print `[k/N] path: caption` for the slot written by this snapshot.
fn render_progress(
    out: &mut dyn Write,
    images: &[PathBuf],
    snapshot: &Snapshot,
    completed: usize,
) -> anyhow::Result<()> {
    let total = snapshot.slots.len();
    let caption = &snapshot.slots[snapshot.index];
    writeln!(out, "[{completed}/{total}] {}: {caption}", images[snapshot.index].display())?;
    out.flush().ok();
    Ok(())
}

fn write_sidecars(sidecars: &[PathBuf], captions: &[String]) -> anyhow::Result<()> {
    for (path, caption) in sidecars.iter().zip(captions) {
        std::fs::write(path, caption)
            .with_context(|| format!("failed to write caption: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "wrote caption file");
    }
    Ok(())
}
