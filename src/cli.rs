//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumable downloads from direct links and file-locker pages.
///
/// Links on Gofile, MediaFire, Google Drive and Pixeldrain are resolved to
/// their direct files first; any other http(s) URL is downloaded as-is.
#[derive(Parser, Debug)]
#[command(name = "lockerdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: <data dir>/lockerdl/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download directory, overriding the settings file
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-10), overriding the settings file
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub concurrency: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve a link, download every file behind it and wait
    Get {
        /// Hosting page or direct URL
        url: String,

        /// File name to save as (single-file links only)
        #[arg(long)]
        name: Option<String>,

        /// Password for a protected shared folder
        #[arg(long)]
        password: Option<String>,
    },

    /// List every job, newest first
    List,

    /// Show one job
    Show {
        /// Job id
        id: i64,
    },

    /// Continue a paused or failed job from its recorded offset
    Resume {
        /// Job id
        id: i64,
    },

    /// Restart a failed job from the beginning
    Retry {
        /// Job id
        id: i64,
    },

    /// Delete a job and its partial file
    Cancel {
        /// Job id
        id: i64,
    },

    /// Delete several jobs and their files
    Delete {
        /// Job ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },

    /// Forget completed jobs (files are kept)
    ClearCompleted,
}

impl Command {
    /// Whether the command starts transfers and should wait for them.
    #[must_use]
    pub fn runs_transfers(&self) -> bool {
        matches!(self, Self::Get { .. } | Self::Resume { .. } | Self::Retry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_get_parses_url_and_options() {
        let args = Args::try_parse_from([
            "lockerdl",
            "get",
            "https://gofile.io/d/abc",
            "--name",
            "game.zip",
            "--password",
            "hunter2",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Get {
                url: "https://gofile.io/d/abc".to_string(),
                name: Some("game.zip".to_string()),
                password: Some("hunter2".to_string()),
            }
        );
        assert!(args.command.runs_transfers());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["lockerdl", "-v", "list"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["lockerdl", "list", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["lockerdl", "-q", "list"]).unwrap();
        assert!(args.quiet);
        assert!(!args.command.runs_transfers());
    }

    #[test]
    fn test_cli_global_overrides() {
        let args = Args::try_parse_from([
            "lockerdl",
            "--config",
            "/tmp/s.json",
            "--dir",
            "/tmp/dl",
            "-c",
            "4",
            "resume",
            "7",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/s.json")));
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/dl")));
        assert_eq!(args.concurrency, Some(4));
        assert_eq!(args.command, Command::Resume { id: 7 });
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        for rejected in ["0", "11"] {
            let err = Args::try_parse_from(["lockerdl", "-c", rejected, "list"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
        let args = Args::try_parse_from(["lockerdl", "-c", "10", "list"]).unwrap();
        assert_eq!(args.concurrency, Some(10));
    }

    #[test]
    fn test_cli_delete_requires_ids() {
        let err = Args::try_parse_from(["lockerdl", "delete"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
        let args = Args::try_parse_from(["lockerdl", "delete", "1", "2", "3"]).unwrap();
        assert_eq!(args.command, Command::Delete { ids: vec![1, 2, 3] });
    }

    #[test]
    fn test_cli_clear_completed_kebab_case() {
        let args = Args::try_parse_from(["lockerdl", "clear-completed"]).unwrap();
        assert_eq!(args.command, Command::ClearCompleted);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["lockerdl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["lockerdl", "list", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
