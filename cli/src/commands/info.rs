use std::path::PathBuf;

use anyhow::Result;
use vdex_extract_vdex::container::Vdex;

use crate::commands::path_helpers::collect_vdex_files;

pub(crate) fn command_info(paths: &[PathBuf]) -> Result<()> {
    let files = collect_vdex_files(paths);
    if files.is_empty() {
        anyhow::bail!("no vdex files found in the given paths");
    }

    for file in &files {
        let data = match std::fs::read(file) {
            Ok(data) => data,
            Err(err) => {
                log::error!("skipping {:?}: {}", file, err);
                continue;
            }
        };

        match Vdex::parse(&data) {
            Ok(vdex) => show(file, &vdex),
            Err(err) => log::error!("skipping {:?}: {}", file, err),
        }
    }

    Ok(())
}

fn show(file: &PathBuf, vdex: &Vdex<'_>) {
    let header = &vdex.header;
    println!(
        "{:?}: vdex version {:03}, {} dex file(s)",
        file,
        header.version.number(),
        header.number_of_dex_files
    );
    println!(
        "  dex size: {}, verifier deps size: {}, quickening info size: {}",
        header.dex_size, header.verifier_deps_size, header.quickening_info_size
    );
    for idx in 0..header.number_of_dex_files as usize {
        if let Some(checksum) = vdex.location_checksum(idx) {
            println!("  [{}] location checksum: {:#010x}", idx, checksum);
        }
    }
}
