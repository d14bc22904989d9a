#![deny(unsafe_code)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use astraea_cli::cli::{Cli, Command, StandardsCommand};
use astraea_cli::commands;
use astraea_cli::config::StudyConfig;
use astraea_cli::logging::{LogConfig, init_logging};
use astraea_standards::ReferenceStore;

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.color.write_global();

    let log_config = LogConfig {
        level: cli.verbosity.tracing_level_filter(),
        format: cli.log_format,
        log_file: cli.log_file.clone(),
        ansi: true,
    };
    if let Err(err) = init_logging(&log_config) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(submission_ready) => {
            if submission_ready {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatch the command. Returns false when the last validation report
/// says the package is not submission ready; the process exit status
/// reflects that.
fn run(cli: Cli) -> Result<bool> {
    let config = StudyConfig::load_or_default(cli.config.as_deref())?;

    // The doctor stays reachable even when the store itself would refuse
    // to load, so a broken bundle can still be diagnosed.
    if let Command::Standards { command } = &cli.command {
        match command {
            StandardsCommand::Verify => commands::standards_verify()?,
            StandardsCommand::Doctor { json } => commands::standards_doctor(json)?,
        }
        return Ok(true);
    }

    // The reference store fails fast on any version or checksum mismatch.
    let store = ReferenceStore::load()?;

    match cli.command {
        // Handled before the store loads.
        Command::Standards { .. } => {}
        Command::Profile { data_dir, out } => {
            commands::profile(&data_dir, out.as_deref())?;
        }
        Command::ParseEcrf { input, out } => {
            commands::parse_ecrf(&input, out.as_deref())?;
        }
        Command::Classify { data_dir, ecrf } => {
            commands::classify(&data_dir, ecrf.as_deref(), &store)?;
        }
        Command::MapDomain {
            domain,
            data_dir,
            learning_db,
            out,
        } => {
            commands::map_domain(
                &domain,
                &data_dir,
                learning_db.as_deref(),
                out.as_deref(),
                &config,
                &store,
            )?;
        }
        Command::ReviewDomain {
            domain,
            spec,
            session_id,
        } => {
            commands::review_domain(&domain, &spec, session_id.as_deref(), &config)?;
        }
        Command::Resume { session_id } => {
            commands::resume(&session_id, &config)?;
        }
        Command::ExecuteDomain {
            domain,
            spec,
            data_dir,
            output_dir,
        } => {
            commands::execute(&domain, &spec, &data_dir, &output_dir, &config, &store)?;
        }
        Command::GenerateTrialDesign { output_dir } => {
            commands::generate_trial_design(&output_dir, &config, &store)?;
        }
        Command::Validate {
            output_dir,
            auto_fix,
        } => {
            let report = commands::validate(&output_dir, auto_fix, &config, &store)?;
            return Ok(report.submission_ready);
        }
        Command::GenerateDefine { output_dir } => {
            commands::generate_define(&output_dir, &config, &store)?;
        }
        Command::GenerateCsdrg { output_dir } => {
            commands::generate_csdrg(&output_dir, &config, &store)?;
        }
        Command::AutoFix { output_dir } => {
            let report = commands::validate(&output_dir, true, &config, &store)?;
            return Ok(report.submission_ready);
        }
    }

    Ok(true)
}
