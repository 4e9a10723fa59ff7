//! CLI argument parsing.

use clap::{Parser, Subcommand};

/// Live tracking server: fetches tracker feeds, posts chat notifications
/// and streams store changes to dashboards.
#[derive(Parser, Debug)]
#[command(name = "livetrack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// HTTP API and live event stream only.
    Serve,
    /// Fetch scheduler and chat notifications only.
    Track,
    /// Both (default).
    All,
}

impl Cli {
    pub fn mode(&self) -> Command {
        self.command.unwrap_or(Command::All)
    }
}

impl Command {
    pub fn serves(self) -> bool {
        matches!(self, Command::Serve | Command::All)
    }

    pub fn tracks(self) -> bool {
        matches!(self, Command::Track | Command::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_all() {
        let cli = Cli::try_parse_from(["livetrack"]).unwrap();
        assert_eq!(cli.mode(), Command::All);
        assert!(cli.mode().serves() && cli.mode().tracks());
    }

    #[test]
    fn subcommands_select_components() {
        let serve = Cli::try_parse_from(["livetrack", "serve"]).unwrap().mode();
        assert!(serve.serves() && !serve.tracks());
        let track = Cli::try_parse_from(["livetrack", "track"]).unwrap().mode();
        assert!(track.tracks() && !track.serves());
        assert!(Cli::try_parse_from(["livetrack", "bogus"]).is_err());
    }
}
