use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use vdex_extract::checksums::load_checksums;
use vdex_extract::{Config, update_checksums};

pub(crate) fn command_checksum(
    path: &Path,
    new_crc: &Path,
    output: &Option<PathBuf>,
    file_override: bool,
) -> Result<()> {
    let checksums = load_checksums(new_crc)
        .with_context(|| format!("can't load checksums from {:?}", new_crc))?;
    if checksums.is_empty() {
        anyhow::bail!("no checksums found in {:?}", new_crc);
    }

    let config = Config {
        output_dir: output.clone(),
        allow_overwrite: file_override,
        ..Config::default()
    };

    let written = update_checksums(path, &checksums, &config)
        .with_context(|| format!("can't update location checksums of {:?}", path))?;

    println!("{} location checksums have been updated", checksums.len());
    println!("updated vdex file is available in {:?}", written);
    Ok(())
}
