use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::retrieve::RetrieveArg;

#[derive(Clone, Debug, Parser)]
#[command(name = "ferry", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// Configuration file.
    #[arg(long, short, global = true, default_value = "ferry.toml")]
    pub config: PathBuf,

    /// Credentials file for the source bucket. Defaults to `credentials.toml`
    /// next to the configuration file, if present.
    #[arg(long, global = true)]
    pub credentials: Option<PathBuf>,

    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Upload every source object not stored yet, then keep tracking replication.
    #[command(name = "run")]
    Run,
    /// Only track replication of objects already stored.
    #[command(alias = "w", name = "watch")]
    Watch,
    /// Benchmark reads of stored objects.
    #[command(alias = "r", name = "retrieve")]
    Retrieve(RetrieveArg),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_run_with_globals() {
        let app = App::try_parse_from(["ferry", "--json", "run", "--config", "x.toml"]).unwrap();
        assert!(app.json);
        assert_eq!(app.config, PathBuf::from("x.toml"));
        assert!(matches!(app.cmd, Commands::Run));
    }

    #[test]
    fn test_parse_retrieve_defaults() {
        let app = App::try_parse_from(["ferry", "retrieve"]).unwrap();
        let Commands::Retrieve(arg) = app.cmd else {
            panic!("expected retrieve");
        };
        assert_eq!(arg.min, 0);
        assert_eq!(arg.max, None);
        assert_eq!(arg.duration, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_retrieve_sizes() {
        let app =
            App::try_parse_from(["ferry", "r", "--min", "1MiB", "--max", "2GB", "--duration", "30s"])
                .unwrap();
        let Commands::Retrieve(arg) = app.cmd else {
            panic!("expected retrieve");
        };
        assert_eq!(arg.min, 1 << 20);
        assert_eq!(arg.max, Some(2_000_000_000));
        assert_eq!(arg.duration, Duration::from_secs(30));
    }

    #[test]
    fn test_requires_a_command() {
        assert!(App::try_parse_from(["ferry"]).is_err());
    }
}
