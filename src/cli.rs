//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::client::DEFAULT_API_HOST;
use crate::output::Format;
use crate::token::TokenSource;

/// Live earthquake intensity map served from your terminal.
#[derive(Parser, Debug)]
#[command(name = "quakemap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the live map dashboard
    Serve(ServeArgs),

    /// Show the current earthquake list (one-shot fetch and exit)
    List(ListArgs),
}

/// How to obtain the feed's access token.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Fixed access token to send with every feed request
    #[arg(long, conflicts_with = "token_url")]
    pub token: Option<String>,

    /// Endpoint returning {"csrfToken": "..."}, asked before every request
    #[arg(long)]
    pub token_url: Option<String>,
}

impl TokenArgs {
    /// Resolve to a token source; no flags means an empty fixed token.
    #[must_use]
    pub fn source(&self) -> TokenSource {
        match (&self.token_url, &self.token) {
            (Some(url), _) => TokenSource::Endpoint(url.clone()),
            (None, token) => TokenSource::Fixed(token.clone().unwrap_or_default()),
        }
    }
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Host serving /api/earthquake_data
    #[arg(long, default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    /// Base URL serving /static/json/{region}.json (defaults to this server)
    #[arg(long)]
    pub map_base: Option<String>,

    /// Topology region (file name and object name)
    #[arg(long, default_value = "Taiwan")]
    pub region: String,

    /// Directory to serve /static/json/ from (required without --map-base)
    #[arg(long, required_unless_present = "map_base")]
    pub static_dir: Option<PathBuf>,

    /// Viewport width used to pick the map scale
    #[arg(long, default_value = "1280")]
    pub viewport_width: u32,

    #[command(flatten)]
    pub token: TokenArgs,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Host serving /api/earthquake_data
    #[arg(long, default_value = DEFAULT_API_HOST)]
    pub api_host: String,

    #[command(flatten)]
    pub token: TokenArgs,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["quakemap", "serve", "--static-dir", "static/json"])
            .expect("parses");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.port, 8080);
        assert_eq!(args.region, "Taiwan");
        assert_eq!(args.api_host, DEFAULT_API_HOST);
        assert_eq!(args.token.source(), TokenSource::Fixed(String::new()));
        assert_eq!(args.static_dir, Some(PathBuf::from("static/json")));
    }

    #[test]
    fn test_serve_needs_a_topology_source() {
        assert!(Cli::try_parse_from(["quakemap", "serve"]).is_err());
        assert!(
            Cli::try_parse_from(["quakemap", "serve", "--map-base", "https://maps.example"]).is_ok()
        );
    }

    #[test]
    fn test_token_url_wins() {
        let cli = Cli::try_parse_from([
            "quakemap",
            "list",
            "--token-url",
            "http://localhost/api/csrf_token",
            "-f",
            "json",
        ])
        .expect("parses");
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(
            args.token.source(),
            TokenSource::Endpoint("http://localhost/api/csrf_token".into())
        );
        assert_eq!(args.format, Format::Json);
    }

    #[test]
    fn test_token_flags_conflict() {
        let result = Cli::try_parse_from([
            "quakemap", "list", "--token", "a", "--token-url", "http://x",
        ]);
        assert!(result.is_err());
    }
}
