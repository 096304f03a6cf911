use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use reqwest::blocking::Client;

/// Downloads `url` to `out_path` unless the file is already there.
///
/// The body is streamed to a `.part` file first so an interrupted transfer
/// never leaves a truncated file under the final name.
pub fn download_noclobber(client: &Client, url: &str, out_path: &Path) -> Result<PathBuf> {
    if out_path.exists() {
        return Ok(out_path.to_path_buf());
    }
    if let Some(dir) = out_path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;
    }

    log::info!("Downloading {} -> {}", url, out_path.display());
    let mut res = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?;
    let status = res.status();
    ensure!(status.is_success(), "HTTP {status} for {url}");

    let part = out_path.with_extension("part");
    let mut f = File::create(&part).with_context(|| format!("open {}", part.display()))?;
    io::copy(&mut res, &mut f).with_context(|| format!("read body: {url}"))?;
    drop(f);
    fs::rename(&part, out_path)
        .with_context(|| format!("rename {} -> {}", part.display(), out_path.display()))?;

    Ok(out_path.to_path_buf())
}
