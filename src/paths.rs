use anyhow::Context;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// `$CAPTIONER_HOME/config`, else `$XDG_CONFIG_HOME/captioner`, else
/// `~/.config/captioner`.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    if let Some(base) = env::var_os("CAPTIONER_HOME").map(PathBuf::from) {
        return ensure_dir(&base.join("config"));
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return ensure_dir(&xdg.join("captioner"));
    }

    ensure_dir(&home_dir()?.join(".config").join("captioner"))
}

/// Caption file written next to an image: `photo.png` -> `photo.txt`.
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension("txt")
}

/// Sidecar paths for a batch, one per image. Fails if two images would
/// share a caption file.
pub fn sidecar_paths(images: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::with_capacity(images.len());
    let mut out = Vec::with_capacity(images.len());
    for image in images {
        let path = sidecar_path(image);
        if let Some(other) = seen.insert(path.clone(), image) {
            anyhow::bail!(
                "{} and {} would both write {}",
                other.display(),
                image.display(),
                path.display()
            );
        }
        out.push(path);
    }
    Ok(out)
}
