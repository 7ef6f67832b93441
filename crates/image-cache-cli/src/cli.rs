//! Command-line arguments

use clap::{Parser, Subcommand};

/// Inspect and populate the local image cache.
///
/// Cache location, budget and URL allow-lists come from the environment:
/// IMAGE_CACHE_ROOT, IMAGE_CACHE_NAMESPACE, IMAGE_CACHE_PRUNE_LIMIT,
/// IMAGE_CACHE_PROTOCOLS, IMAGE_CACHE_HOSTS.
#[derive(Debug, Parser)]
#[command(name = "image-cache", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch URLs into the cache if needed and print their local paths
    Resolve {
        /// Exempt these entries from pruning
        #[arg(long)]
        permanent: bool,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Delete the oldest ephemeral entries until the cache fits its budget
    Prune,
    /// Print cache statistics as JSON
    Stats,
    /// Print the cache filename a URL maps to
    Filename { url: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "image-cache",
            "resolve",
            "--permanent",
            "https://example.com/a.png",
            "https://example.com/b.png",
        ])
        .unwrap();

        match cli.command {
            Command::Resolve { permanent, urls } => {
                assert!(permanent);
                assert_eq!(urls.len(), 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_requires_a_url() {
        assert!(Cli::try_parse_from(["image-cache", "resolve"]).is_err());
    }

    #[test]
    fn test_parse_prune_and_filename() {
        let cli = Cli::try_parse_from(["image-cache", "prune"]).unwrap();
        assert!(matches!(cli.command, Command::Prune));

        let cli = Cli::try_parse_from(["image-cache", "filename", "https://example.com/a.png"])
            .unwrap();
        assert!(matches!(cli.command, Command::Filename { url } if url.ends_with("a.png")));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
