use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::{command_checksum, command_extract, command_info};

mod commands;

#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    /// Log verbosity
    #[arg(
        short = 'v',
        long = "log-level",
        value_enum,
        global = true,
        default_value = "info"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    commands: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> log::LevelFilter {
        match level {
            // aborts surface on stderr either way, so fatal mutes the logger
            LogLevel::Fatal => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract dex files, reverting quickened bytecode by default
    Extract {
        /// Input vdex files or directories (walked one level deep)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory, defaults to each input's own directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Allow overwriting existing output files
        #[arg(short = 'f', long = "file-override")]
        file_override: bool,

        /// Emit dex files verbatim, skipping the unquicken pass
        #[arg(long)]
        no_unquicken: bool,

        /// Dump the verifier dependencies report
        #[arg(long)]
        deps: bool,

        /// Print a per-method disassembly of every emitted dex
        #[arg(long)]
        dis: bool,
    },

    /// Rewrite the location checksums of a single vdex file
    Checksum {
        path: PathBuf,

        /// Text file with one checksum per line, decimal or 0x-prefixed hex
        #[arg(long = "new-crc")]
        new_crc: PathBuf,

        /// Output directory, defaults to the input's own directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Allow overwriting existing output files
        #[arg(short = 'f', long = "file-override")]
        file_override: bool,
    },

    /// Print header information of vdex files
    Info {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level.into())
        .init();

    let result = match &cli.commands {
        Some(Commands::Extract {
            paths,
            output,
            file_override,
            no_unquicken,
            deps,
            dis,
        }) => command_extract(paths, output, *file_override, *no_unquicken, *deps, *dis),
        Some(Commands::Checksum {
            path,
            new_crc,
            output,
            file_override,
        }) => command_checksum(path, new_crc, output, *file_override),
        Some(Commands::Info { paths }) => command_info(paths),
        None => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}
