//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Incrementally mirror media posts from feed sources.
///
/// Catchup walks each configured source's feed from newest to oldest,
/// downloads whatever was posted since the last run, and can serve a local
/// review page for pruning the results afterwards.
#[derive(Parser, Debug)]
#[command(name = "catchup")]
#[command(author, version, about)]
pub struct Args {
    /// Path to the session configuration file
    #[arg(short = 'c', long, default_value = "config.json")]
    pub config: PathBuf,

    /// Serve the review page after catching up
    #[arg(short = 's', long)]
    pub serve: bool,

    /// Review server port (overrides the config; 0 picks an ephemeral port)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Skip the catch-up walk and go straight to review
    #[arg(long)]
    pub bypass: bool,

    /// Do not advance watermarks or rewrite the config
    #[arg(long)]
    pub preserve: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["catchup"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(!args.serve);
        assert!(!args.bypass);
        assert!(!args.preserve);
        assert_eq!(args.port, None);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_config_short_and_long_flags() {
        let args = Args::try_parse_from(["catchup", "-c", "other.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("other.json"));

        let args = Args::try_parse_from(["catchup", "--config", "elsewhere.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("elsewhere.json"));
    }

    #[test]
    fn test_cli_serve_and_port() {
        let args = Args::try_parse_from(["catchup", "-s", "-p", "8080"]).unwrap();
        assert!(args.serve);
        assert_eq!(args.port, Some(8080));
    }

    #[test]
    fn test_cli_bypass_and_preserve() {
        let args = Args::try_parse_from(["catchup", "--bypass", "--preserve"]).unwrap();
        assert!(args.bypass);
        assert!(args.preserve);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["catchup", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["catchup", "--invalid-flag"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["catchup", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
