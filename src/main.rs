//! Main entry point for the clonecheck CLI app.

use clonecheck::cli::{self, Commands, SourceType};
use clonecheck::generate::{self, GenerateConfig};
use clonecheck::reporter::Reporter;
use clonecheck::validate::{self, ValidateConfig};
use clonecheck::CheckError;
use std::process::ExitCode;
use tracing_subscriber::filter::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    if let Err(e) = run_app() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_app() -> Result<(), CheckError> {
    let command = cli::run();
    command.check()?;

    match command {
        Commands::Generate {
            source,
            output,
            source_type,
            reader,
            writer,
            out_name,
        } => match source_type {
            SourceType::Fs => {
                let config = GenerateConfig {
                    source_dir: source,
                    output_dir: output,
                    out_name,
                    reader_count: reader,
                    writer_count: writer,
                };
                let summary = generate::generate(&config)?;
                println!(
                    "[generate] snapshot complete | items: {} | {}",
                    summary.item_count,
                    summary.snapshot_path.display()
                );
            }
            SourceType::Oss => {
                return Err(CheckError::Config(
                    "object storage source is not implemented yet".to_string(),
                ))
            }
        },
        Commands::Validate {
            target,
            meta,
            source_type,
            validator,
            report,
        } => match source_type {
            SourceType::Fs => {
                let reporter = Reporter::new(&report).map_err(|e| CheckError::Write {
                    source: e,
                    path: report.clone(),
                })?;
                let config = ValidateConfig {
                    target_dir: target,
                    meta_path: meta,
                    validator_count: validator,
                };

                // Flush whatever was recorded, even when validate failed.
                let result = validate::validate(&config, &reporter);
                if let Err(e) = reporter.flush() {
                    tracing::warn!(error = %e, "failed to write the failure report");
                }
                let summary = result?;
                println!(
                    "[validate] snapshot processed | items: {} | failures: {}",
                    summary.processed, summary.failures
                );
            }
            SourceType::Oss => {
                return Err(CheckError::Config(
                    "object storage target is not implemented yet".to_string(),
                ))
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
