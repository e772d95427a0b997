//! The per-file pipeline: read, validate, dispatch, then either extract
//! (optionally unquickening and disassembling) or rewrite location checksums.
//!
//! Failures inside one container abort that container only; the caller logs
//! and moves to the next input file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use vdex_extract_dex::dex::Dex;
use vdex_extract_dex::disasm;
use vdex_extract_vdex::container::{HEADER_SIZE, Vdex, set_location_checksum};
use vdex_extract_vdex::deps;
use vdex_extract_vdex::dispatch::Backend;
use vdex_extract_vdex::errors::VdexError;
use vdex_extract_vdex::unquicken::unquicken_dex;

use crate::config::Config;
use crate::errors::ExtractError;
use crate::output::OutputSink;

/// Smallest input worth parsing: a vdex header plus one dex header.
const MIN_FILE_SIZE: usize = HEADER_SIZE + 0x70;

/// Per-container outcome counters
#[derive(Debug, Default)]
pub struct ProcessStats {
    /// Dex files emitted from this container
    pub dex_extracted: usize,
}

fn read_input(path: &Path) -> Result<Vec<u8>, ExtractError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut input = Vec::new();
    reader.read_to_end(&mut input)?;

    if input.is_empty() {
        return Err(ExtractError::InvalidInput("got empty file"));
    }
    Ok(input)
}

/// Extract every dex file of the container at `path`.
pub fn process_vdex(path: &Path, config: &Config) -> Result<ProcessStats, ExtractError> {
    let data = read_input(path)?;
    if data.len() < MIN_FILE_SIZE {
        return Err(ExtractError::InvalidInput(
            "file too small for a vdex container",
        ));
    }

    let vdex = Vdex::parse(&data)?;
    vdex.log_header();

    let backend = Backend::new(vdex.header.version);

    if config.dump_deps {
        dump_deps(&vdex, &backend)?;
    }

    let mut info = backend.quickening_index(&vdex)?;
    let sink = OutputSink::new(config);
    let total = vdex.header.number_of_dex_files as usize;
    let unquicken = config.unquicken && vdex.header.quickening_info_size > 0;

    let mut stats = ProcessStats::default();
    for slice in vdex.dex_files() {
        let slice = slice?;

        let written = if unquicken {
            let mut dex = Dex::new(slice.data.to_vec())?;
            let rewritten = unquicken_dex(&mut dex, &mut info, slice.index)?;
            if rewritten > 0 {
                dex.repair_checksum();
            }
            log::debug!(
                "dex file #{}: {} instructions reverted",
                slice.index,
                rewritten
            );

            if config.disassemble {
                print_disassembly(&dex, slice.index)?;
            }
            sink.write_dex(path, slice.index, total, dex.data())?
        } else {
            if config.disassemble {
                let dex = Dex::new(slice.data.to_vec())?;
                print_disassembly(&dex, slice.index)?;
            }
            sink.write_dex(path, slice.index, total, slice.data)?
        };

        log::info!("dex file #{} extracted to {:?}", slice.index, written);
        stats.dex_extracted += 1;
    }

    if stats.dex_extracted != total {
        return Err(VdexError::Truncated("dex file count").into());
    }

    Ok(stats)
}

fn dump_deps(vdex: &Vdex<'_>, backend: &Backend) -> Result<(), ExtractError> {
    let decoded = backend.decode_deps(vdex)?;
    if decoded.per_dex.is_empty() {
        log::warn!("empty verifier dependency data");
        return Ok(());
    }

    let mut dexes = Vec::new();
    for slice in vdex.dex_files() {
        let slice = slice?;
        dexes.push(Dex::new(slice.data.to_vec())?);
    }

    println!("{}", deps::render(&decoded, &dexes));
    Ok(())
}

fn print_disassembly(dex: &Dex, index: usize) -> Result<(), ExtractError> {
    let mut listing = String::new();
    disasm::disassemble_into(dex, &mut listing)?;
    println!("dex file #{}", index);
    print!("{}", listing);
    Ok(())
}

/// Rewrite the container's location checksums and emit it whole.
///
/// The sidecar count must match the container's dex count exactly; nothing
/// else about the file is touched, so the operation is idempotent.
pub fn update_checksums(
    path: &Path,
    checksums: &[u32],
    config: &Config,
) -> Result<PathBuf, ExtractError> {
    let mut data = read_input(path)?;

    let expected = {
        let vdex = Vdex::parse(&data)?;
        vdex.header.number_of_dex_files
    };

    if checksums.len() != expected as usize {
        return Err(ExtractError::ChecksumCountMismatch {
            loaded: checksums.len(),
            expected,
        });
    }

    for (idx, value) in checksums.iter().enumerate() {
        set_location_checksum(&mut data, idx, *value)?;
    }

    let sink = OutputSink::new(config);
    sink.write_vdex(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use vdex_extract_dex::test_fixtures::build_test_dex;

    fn build_vdex(version: &[u8; 4], dexes: &[Vec<u8>], checksums: &[u32]) -> Vec<u8> {
        let dex_size: usize = dexes.iter().map(|dex| dex.len()).sum();
        let mut buf = Vec::new();
        buf.extend_from_slice(b"vdex");
        buf.extend_from_slice(version);
        buf.extend_from_slice(&(checksums.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(dex_size as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        for checksum in checksums {
            buf.extend_from_slice(&checksum.to_le_bytes());
        }
        for dex in dexes {
            buf.extend_from_slice(dex);
        }
        buf
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vdex-process-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn v6_without_quickening_extracts_byte_for_byte() {
        let dir = scratch_dir("verbatim");
        let dex = build_test_dex();
        let input = dir.join("app.vdex");
        fs::write(&input, build_vdex(b"006\0", &[dex.clone()], &[0xA])).unwrap();

        let stats = process_vdex(&input, &Config::default()).unwrap();
        assert_eq!(stats.dex_extracted, 1);
        assert_eq!(fs::read(dir.join("app_classes.dex")).unwrap(), dex);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn declared_dex_count_must_match() {
        let dir = scratch_dir("count");
        // header claims two dex files (two checksums), the section holds one
        let dex = build_test_dex();
        let data = build_vdex(b"010\0", &[dex], &[0xA, 0xB]);

        let input = dir.join("app.vdex");
        fs::write(&input, data).unwrap();

        let config = Config {
            output_dir: Some(dir.clone()),
            allow_overwrite: true,
            ..Config::default()
        };
        assert!(matches!(
            process_vdex(&input, &config),
            Err(ExtractError::VdexError(VdexError::Truncated(_)))
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn checksum_rewrite_is_exact_and_idempotent() {
        let dir = scratch_dir("crc");
        let dex = build_test_dex();
        let original = build_vdex(b"010\0", &[dex.clone(), dex], &[0xA, 0xB]);
        let input = dir.join("app.vdex");
        fs::write(&input, &original).unwrap();

        let out_dir = dir.join("out");
        let config = Config {
            output_dir: Some(out_dir.clone()),
            allow_overwrite: true,
            ..Config::default()
        };

        let written = update_checksums(&input, &[0x11111111, 22], &config).unwrap();
        let rewritten = fs::read(&written).unwrap();

        assert_eq!(
            &rewritten[24..32],
            &[0x11, 0x11, 0x11, 0x11, 0x16, 0x00, 0x00, 0x00]
        );
        assert_eq!(&rewritten[..24], &original[..24]);
        assert_eq!(&rewritten[32..], &original[32..]);

        // applying the same sidecar to the rewritten file changes nothing
        let twice = update_checksums(&written, &[0x11111111, 22], &config).unwrap();
        assert_eq!(fs::read(&twice).unwrap(), rewritten);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn checksum_count_mismatch_is_reported() {
        let dir = scratch_dir("crc-mismatch");
        let dex = build_test_dex();
        let input = dir.join("app.vdex");
        fs::write(&input, build_vdex(b"010\0", &[dex], &[0xA])).unwrap();

        assert!(matches!(
            update_checksums(&input, &[1, 2], &Config::default()),
            Err(ExtractError::ChecksumCountMismatch {
                loaded: 2,
                expected: 1
            })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
