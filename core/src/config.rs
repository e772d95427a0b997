use std::path::PathBuf;

/// Run configuration shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct Config {
    /// Destination directory; the input's parent directory when unset
    pub output_dir: Option<PathBuf>,

    /// Allow clobbering existing output files
    pub allow_overwrite: bool,

    /// Revert quickened bytecode; disabled, dex files are emitted verbatim
    pub unquicken: bool,

    /// Print the verifier dependencies report
    pub dump_deps: bool,

    /// Print a per-method disassembly of every emitted dex
    pub disassemble: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            output_dir: None,
            allow_overwrite: false,
            unquicken: true,
            dump_deps: false,
            disassemble: false,
        }
    }
}
