//! Command-line interface definitions for News Intel.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Global options can also be supplied through environment variables.

use clap::{Parser, Subcommand, ValueEnum};

/// Navigation engine used for every page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Headless Chrome over the DevTools protocol. Follows client-side redirects.
    Chrome,
    /// Plain HTTP requests. No JavaScript, so redirect tokens do not resolve.
    Http,
}

/// Command-line arguments for the News Intel crawler.
///
/// # Examples
///
/// ```sh
/// # Crawl the first priority topic and print the run as JSON
/// news_intel run
///
/// # Crawl a named topic, five items, writing the JSON to ./json
/// news_intel run --topic tecnologia --max-items 5 -j ./json
///
/// # Expand a story cluster over plain HTTP
/// news_intel --engine http dive https://news.google.com/stories/CAAq...
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "NEWS_INTEL_CONFIG", global = true)]
    pub config: Option<String>,

    /// Navigation engine
    #[arg(long, value_enum, default_value_t = Engine::Chrome, global = true)]
    pub engine: Engine,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the discovered topics as JSON
    Topics,

    /// Print the headline cards of a topic or story page as JSON
    Headlines {
        /// Topic or story URL
        url: String,
    },

    /// Run the full pipeline
    Run {
        /// Topic, story or article URL; discovered from the home page when omitted
        #[arg(long)]
        url: Option<String>,

        /// Preferred topic name when discovering
        #[arg(long)]
        topic: Option<String>,

        /// Maximum number of headlines to process
        #[arg(long)]
        max_items: Option<usize>,

        /// Output directory for the run JSON; printed to stdout when omitted
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },

    /// Expand a story cluster into all of its articles
    Dive {
        /// Story URL
        url: String,

        /// Maximum number of articles to fetch
        #[arg(long)]
        max_items: Option<usize>,

        /// Output directory for the run JSON; printed to stdout when omitted
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "news_intel",
            "run",
            "--topic",
            "tecnologia",
            "--max-items",
            "5",
            "--json-output-dir",
            "./json",
        ]);

        assert_eq!(cli.engine, Engine::Chrome);
        match cli.command {
            Command::Run {
                url,
                topic,
                max_items,
                json_output_dir,
            } => {
                assert_eq!(url, None);
                assert_eq!(topic.as_deref(), Some("tecnologia"));
                assert_eq!(max_items, Some(5));
                assert_eq!(json_output_dir.as_deref(), Some("./json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_short_flags_and_global_engine() {
        let cli = Cli::parse_from([
            "news_intel",
            "dive",
            "https://news.google.com/stories/CAAq",
            "-j",
            "/tmp/json",
            "--engine",
            "http",
            "-c",
            "/etc/news_intel.yaml",
        ]);

        assert_eq!(cli.engine, Engine::Http);
        assert_eq!(cli.config.as_deref(), Some("/etc/news_intel.yaml"));
        match cli.command {
            Command::Dive {
                url, json_output_dir, ..
            } => {
                assert_eq!(url, "https://news.google.com/stories/CAAq");
                assert_eq!(json_output_dir.as_deref(), Some("/tmp/json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_headlines_requires_url() {
        assert!(Cli::try_parse_from(["news_intel", "headlines"]).is_err());
    }
}
