//! CLI Tooling
//!
//! Thin front end over `PipelineContext`. Each command runs one pipeline
//! operation and renders its report; the exit code follows the audit outcome.

use crate::audit::AuditOutcome;
use crate::concurrency::CancellationFlag;
use crate::config::{ConfigLoader, MusterConfig};
use crate::error::ApiError;
use crate::logging::init_logging;
use crate::pipeline::{DuplicateRequest, PipelineContext, SyncFilter, SyncRequest};
use crate::sync::SyncMode;
use crate::tooling::format::{
    format_audit_json, format_audit_text, format_detection_report, format_ready,
    format_scan_report, format_sync_report,
};
use crate::types::DiskId;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Muster CLI - ingest, deduplicate and archive-reconcile disk folders
#[derive(Parser)]
#[command(name = "muster")]
#[command(about = "Ingest, deduplicate and archive-reconcile mustered floppy disk folders")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the store and run lock
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Move an existing run lock aside even if its process is still alive
    #[arg(long, global = true)]
    pub force_unlock: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scan a root of disk folders and update disk records
    Scan {
        /// Corpus root
        root: PathBuf,
        /// Treat every subfolder as a disk instead of looking for the marker file
        #[arg(long)]
        all_subfolders: bool,
    },
    /// Detect exact and partial duplicate disks by content hash
    FindDuplicates {
        /// Report relation changes without writing them
        #[arg(long)]
        dry_run: bool,
        /// Drop stored relations before detecting
        #[arg(long)]
        clear: bool,
        /// Only reconcile relations involving this disk
        #[arg(long)]
        identifier: Option<String>,
    },
    /// Check disks against the remote archive, optionally pulling or pushing
    SyncCheck {
        /// Copy archive metadata into out-of-sync disks
        #[arg(long, conflicts_with = "push")]
        pull: bool,
        /// Upload out-of-sync disks that are ready to upload
        #[arg(long)]
        push: bool,
        /// Report what would change without uploading or saving
        #[arg(long)]
        dry_run: bool,
        /// Only process this disk
        #[arg(long)]
        identifier: Option<String>,
        /// Only disks whose last check found differences
        #[arg(long, conflicts_with = "uploaded_only")]
        out_of_sync_only: bool,
        /// Only disks that already have an archive item
        #[arg(long)]
        uploaded_only: bool,
    },
    /// Mark a disk ready to upload
    Ready {
        identifier: String,
        /// Clear the flag instead
        #[arg(long)]
        unset: bool,
    },
    /// Show recorded pipeline runs
    Audit {
        /// Only the most recent N runs
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Rendered command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub exit_code: i32,
}

impl CommandOutput {
    fn from_outcome(text: String, outcome: AuditOutcome) -> Self {
        let exit_code = match outcome {
            AuditOutcome::Success => 0,
            AuditOutcome::Partial => 2,
            AuditOutcome::Failed => 1,
        };
        Self { text, exit_code }
    }

    fn ok(text: String) -> Self {
        Self { text, exit_code: 0 }
    }
}

/// CLI context: loaded configuration plus an open pipeline.
pub struct CliContext {
    pipeline: PipelineContext,
}

/// Load configuration for `root` (or an explicit file) and fold CLI overrides in.
pub fn load_config(cli: &Cli, root: &Path) -> Result<MusterConfig, ApiError> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(root)?,
    };

    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        config.logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
    if let Commands::Scan {
        all_subfolders: true,
        ..
    } = &cli.command
    {
        config.scan.all_subfolders = true;
    }
    Ok(config)
}

impl CliContext {
    /// Load configuration, install logging, take the run lock and open the store.
    pub fn new(cli: &Cli, cancel: CancellationFlag) -> Result<Self, ApiError> {
        let root = match &cli.command {
            Commands::Scan { root, .. } => root.clone(),
            _ => std::env::current_dir()?,
        };
        let config = load_config(cli, &root)?;
        init_logging(Some(&config.logging))?;
        let pipeline = if cli.force_unlock {
            PipelineContext::open_force_unlock(config, cancel)?
        } else {
            PipelineContext::open(config, cancel)?
        };
        Ok(Self { pipeline })
    }

    pub fn from_pipeline(pipeline: PipelineContext) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }

    /// Execute a command
    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        match command {
            Commands::Scan { root, .. } => {
                let run = self.pipeline.run_scan(root)?;
                Ok(CommandOutput::from_outcome(
                    format_scan_report(&run),
                    run.audit.outcome,
                ))
            }
            Commands::FindDuplicates {
                dry_run,
                clear,
                identifier,
            } => {
                let request = DuplicateRequest {
                    dry_run: *dry_run,
                    clear: *clear,
                    identifier: identifier.as_deref().map(DiskId::new),
                };
                let run = self.pipeline.run_find_duplicates(&request)?;
                Ok(CommandOutput::from_outcome(
                    format_detection_report(&run),
                    run.audit.outcome,
                ))
            }
            Commands::SyncCheck {
                pull,
                push,
                dry_run,
                identifier,
                out_of_sync_only,
                uploaded_only,
            } => {
                let mode = match (*pull, *push) {
                    (true, true) => {
                        return Err(ApiError::ConfigError(
                            "Cannot use both --pull and --push".to_string(),
                        ))
                    }
                    (true, false) => SyncMode::Pull,
                    (false, true) => SyncMode::Push,
                    (false, false) => SyncMode::CheckOnly,
                };
                let filter = match (*out_of_sync_only, *uploaded_only) {
                    (true, _) => SyncFilter::OutOfSyncOnly,
                    (false, true) => SyncFilter::UploadedOnly,
                    (false, false) => SyncFilter::All,
                };
                let request = SyncRequest {
                    mode,
                    dry_run: *dry_run,
                    identifier: identifier.as_deref().map(DiskId::new),
                    filter,
                };
                let run = self.pipeline.run_sync(&request).await?;
                Ok(CommandOutput::from_outcome(
                    format_sync_report(&run),
                    run.audit.outcome,
                ))
            }
            Commands::Ready { identifier, unset } => {
                let run = self
                    .pipeline
                    .set_upload_ready(&DiskId::new(identifier.as_str()), !*unset)?;
                Ok(CommandOutput::ok(format_ready(&run)))
            }
            Commands::Audit { limit, format } => {
                let entries = self.pipeline.audit_log(*limit)?;
                let text = match format.as_str() {
                    "json" => format_audit_json(&entries)?,
                    "text" => format_audit_text(&entries),
                    other => {
                        return Err(ApiError::ConfigError(format!(
                            "Unknown format '{}'; use text or json",
                            other
                        )))
                    }
                };
                Ok(CommandOutput::ok(text))
            }
        }
    }
}
