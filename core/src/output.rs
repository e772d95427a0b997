//! File emission under the caller's output-directory policy.
//!
//! Every artifact is written atomically: bytes land in a sibling temp file
//! that is renamed into place, so a failure mid-way never corrupts an output
//! that was already emitted.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::ExtractError;

/// Resolves destination paths and writes artifacts.
#[derive(Debug)]
pub struct OutputSink {
    output_dir: Option<PathBuf>,
    allow_overwrite: bool,
}

/// Name of an extracted dex: the input stem plus `_classes.dex`, with the
/// 0-based ordinal appended when the container holds more than one.
pub fn dex_file_name(input: &Path, ordinal: usize, total: usize) -> OsString {
    let mut name = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));

    if total == 1 {
        name.push("_classes.dex");
    } else {
        name.push(format!("_classes{}.dex", ordinal));
    }
    name
}

impl OutputSink {
    pub fn new(config: &Config) -> OutputSink {
        OutputSink {
            output_dir: config.output_dir.clone(),
            allow_overwrite: config.allow_overwrite,
        }
    }

    /// Destination directory for artifacts of `input`
    fn dest_dir(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// Emit one extracted dex file.
    pub fn write_dex(
        &self,
        input: &Path,
        ordinal: usize,
        total: usize,
        bytes: &[u8],
    ) -> Result<PathBuf, ExtractError> {
        let dest = self.dest_dir(input).join(dex_file_name(input, ordinal, total));
        self.write_atomic(dest, bytes)
    }

    /// Emit a rewritten container under its original file name.
    pub fn write_vdex(&self, input: &Path, bytes: &[u8]) -> Result<PathBuf, ExtractError> {
        let name = input
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("output.vdex"));
        let dest = self.dest_dir(input).join(name);
        self.write_atomic(dest, bytes)
    }

    fn write_atomic(&self, dest: PathBuf, bytes: &[u8]) -> Result<PathBuf, ExtractError> {
        if dest.exists() && !self.allow_overwrite {
            return Err(ExtractError::OutputExists(dest));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = dest.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &dest)?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dex_containers_drop_the_ordinal() {
        let name = dex_file_name(Path::new("/data/app.vdex"), 0, 1);
        assert_eq!(name, OsString::from("app_classes.dex"));
    }

    #[test]
    fn multi_dex_containers_use_zero_based_ordinals() {
        let input = Path::new("/data/app.vdex");
        assert_eq!(dex_file_name(input, 0, 2), OsString::from("app_classes0.dex"));
        assert_eq!(dex_file_name(input, 1, 2), OsString::from("app_classes1.dex"));
    }

    #[test]
    fn default_destination_is_the_input_parent() {
        let sink = OutputSink::new(&Config::default());
        assert_eq!(
            sink.dest_dir(Path::new("/data/app.vdex")),
            PathBuf::from("/data")
        );
        assert_eq!(sink.dest_dir(Path::new("app.vdex")), PathBuf::from("."));
    }

    #[test]
    fn refuses_to_clobber_without_overwrite() {
        let dir = std::env::temp_dir().join(format!("vdex-sink-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("app.vdex");

        let sink = OutputSink::new(&Config {
            output_dir: Some(dir.clone()),
            ..Config::default()
        });

        let written = sink.write_dex(&input, 0, 1, b"first").unwrap();
        assert_eq!(fs::read(&written).unwrap(), b"first");

        assert!(matches!(
            sink.write_dex(&input, 0, 1, b"second"),
            Err(ExtractError::OutputExists(_))
        ));

        let sink = OutputSink::new(&Config {
            output_dir: Some(dir.clone()),
            allow_overwrite: true,
            ..Config::default()
        });
        sink.write_dex(&input, 0, 1, b"second").unwrap();
        assert_eq!(fs::read(&written).unwrap(), b"second");

        let _ = fs::remove_dir_all(&dir);
    }
}
