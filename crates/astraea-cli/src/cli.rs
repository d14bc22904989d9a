//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "astraea",
    version,
    about = "Astraea SDTM - agentic clinical data to SDTM submission pipeline",
    long_about = "Transform raw clinical study datasets plus an annotated eCRF \
                  into CDISC SDTM submission datasets.\n\n\
                  The pipeline proposes mappings with a language model, gates \
                  them through human review, executes the approved specs \
                  deterministically, and produces transport files, define.xml, \
                  a cSDRG, and validation reports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Log output format (pretty for humans, json for machine parsing).
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Study configuration file.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect the bundled reference standards.
    Standards {
        #[command(subcommand)]
        command: StandardsCommand,
    },

    /// Profile raw datasets: statistics, EDC columns, date detection.
    Profile {
        /// Directory with the raw dataset files.
        data_dir: PathBuf,

        /// Write profiles to this directory (default: <data_dir>/.astraea).
        #[arg(long = "out", value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Normalize and cache a parsed eCRF extraction.
    ParseEcrf {
        /// JSON produced by the external PDF extraction step.
        input: PathBuf,

        /// Cache location (default: .astraea/ecrf.json).
        #[arg(long = "out", value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Classify raw datasets to SDTM domains.
    Classify {
        /// Directory with the raw dataset files.
        data_dir: PathBuf,

        /// Parsed eCRF cache for context.
        #[arg(long = "ecrf", value_name = "PATH")]
        ecrf: Option<PathBuf>,
    },

    /// Propose a mapping spec for one domain.
    MapDomain {
        /// Target SDTM domain code.
        domain: String,

        /// Directory with the raw dataset files.
        data_dir: PathBuf,

        /// Learning database for few-shot retrieval.
        #[arg(long = "learning-db", value_name = "PATH")]
        learning_db: Option<PathBuf>,

        /// Where to write the proposed spec (default: output/<domain>_spec.json).
        #[arg(long = "out", value_name = "PATH")]
        out: Option<PathBuf>,
    },

    /// Review a proposed spec interactively.
    ReviewDomain {
        /// Target SDTM domain code.
        domain: String,

        /// Proposed spec JSON.
        spec: PathBuf,

        /// Resume an existing session instead of starting a new one.
        #[arg(long = "session-id", value_name = "ID")]
        session_id: Option<String>,
    },

    /// Resume an interrupted review session.
    Resume {
        /// Session identifier.
        session_id: String,
    },

    /// Execute an approved spec against the raw data.
    ExecuteDomain {
        /// Target SDTM domain code.
        domain: String,

        /// Approved spec JSON.
        spec: PathBuf,

        /// Directory with the raw dataset files.
        data_dir: PathBuf,

        /// Output directory for transport files.
        output_dir: PathBuf,
    },

    /// Generate the TS (Trial Summary) domain from study configuration.
    GenerateTrialDesign {
        /// Output directory for ts.xpt.
        output_dir: PathBuf,
    },

    /// Validate executed datasets and write the validation report.
    Validate {
        /// Output directory with the transport files.
        output_dir: PathBuf,

        /// Apply deterministic fixes and re-validate.
        #[arg(long = "auto-fix")]
        auto_fix: bool,
    },

    /// Generate define.xml from executed domains and their specs.
    GenerateDefine {
        /// Output directory with transport files and spec JSONs.
        output_dir: PathBuf,
    },

    /// Generate the cSDRG from pipeline state.
    GenerateCsdrg {
        /// Output directory with reports and spec JSONs.
        output_dir: PathBuf,
    },

    /// Run the auto-fixer standalone.
    AutoFix {
        /// Output directory with the transport files.
        output_dir: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum StandardsCommand {
    /// Verify the manifest pins and asset checksums.
    Verify,

    /// Write a machine-readable bundle report. Use '-' for stdout.
    Doctor {
        #[arg(long, value_name = "PATH")]
        json: String,
    },
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
