use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use vdex_extract::{Config, process_vdex};

use crate::commands::path_helpers::collect_vdex_files;

pub(crate) fn command_extract(
    paths: &[PathBuf],
    output: &Option<PathBuf>,
    file_override: bool,
    no_unquicken: bool,
    deps: bool,
    dis: bool,
) -> Result<()> {
    let files = collect_vdex_files(paths);
    if files.is_empty() {
        anyhow::bail!("no vdex files found in the given paths");
    }

    let config = Config {
        output_dir: output.clone(),
        allow_overwrite: file_override,
        unquicken: !no_unquicken,
        dump_deps: deps,
        disassemble: dis,
    };

    println!("processing {} file(s)", files.len());

    let mut processed = 0usize;
    let mut extracted = 0usize;
    for file in &files {
        log::debug!("processing {:?}", file);

        match process_vdex(file, &config) {
            Ok(stats) => {
                processed += 1;
                extracted += stats.dex_extracted;
            }
            Err(err) => {
                let err = anyhow::Error::from(err);
                log::error!("skipping {:?}: {:#}", file, err);
            }
        }
    }

    let summary = format!("{} out of {} vdex files processed", processed, files.len());
    if processed == files.len() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    println!("{} dex files extracted in total", extracted);

    // per-file failures were already reported; the run itself completed
    Ok(())
}
