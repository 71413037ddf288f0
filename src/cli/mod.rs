use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::error::CheckError;
use crate::snapshot::SNAPSHOT_FILE_NAME;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Generate a metadata snapshot from a data source.
    #[command(alias = "g")]
    Generate {
        /// Source directory (or storage bucket) to snapshot.
        #[arg(short, long)]
        source: PathBuf,

        /// Output directory for the snapshot file and its scratch space.
        #[arg(short, long)]
        output: PathBuf,

        /// Kind of data source to read.
        #[arg(short = 't', long = "type", value_enum, default_value_t = SourceType::Fs)]
        source_type: SourceType,

        /// Number of reader workers that stat files and build records.
        #[arg(short, long, default_value_t = 1)]
        reader: usize,

        /// Number of writer workers that spool records into shard files.
        #[arg(short, long, default_value_t = 1)]
        writer: usize,

        /// Basename of the snapshot inside the output directory.
        #[arg(long, default_value = SNAPSHOT_FILE_NAME)]
        out_name: String,
    },

    /// Validate a target tree against a metadata snapshot.
    #[command(alias = "v")]
    Validate {
        /// Target directory (or storage bucket) to check.
        #[arg(short, long)]
        target: PathBuf,

        /// Path of the snapshot file produced by generate.
        #[arg(short, long)]
        meta: PathBuf,

        /// Kind of target to validate.
        #[arg(short = 'y', long = "type", value_enum, default_value_t = SourceType::Fs)]
        source_type: SourceType,

        /// Number of verifier workers.
        #[arg(short, long, default_value_t = 16)]
        validator: usize,

        /// Path of the failure report file. Only written when there is at
        /// least one failure.
        #[arg(long, default_value = "error_report.txt")]
        report: PathBuf,
    },
}

/// Kinds of storage a snapshot can describe. Object storage is reserved in
/// the snapshot format; the code path behind it is a stub.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceType {
    /// A local or mounted file system tree.
    Fs,
    /// An object storage bucket (not implemented yet).
    Oss,
}

impl Commands {
    /// Flag validation that runs before any I/O.
    pub fn check(&self) -> Result<(), CheckError> {
        match self {
            Commands::Generate { reader, writer, .. } => {
                if *reader < 1 {
                    return Err(CheckError::Config(format!(
                        "reader count must be greater than 0, got {}",
                        reader
                    )));
                }
                if *writer < 1 {
                    return Err(CheckError::Config(format!(
                        "writer count must be greater than 0, got {}",
                        writer
                    )));
                }
            }
            Commands::Validate { validator, .. } => {
                if *validator < 1 {
                    return Err(CheckError::Config(format!(
                        "validator count must be greater than 0, got {}",
                        validator
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parses command-line arguments and returns the command to execute.
pub fn run() -> Commands {
    Args::parse().command
}
