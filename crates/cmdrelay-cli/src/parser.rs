//! Root CLI structure.

use clap::Parser;

use crate::commands::Commands;

/// Relay allowlisted commands and sandboxed file reads from HTTP to a
/// restricted TCP backend.
#[derive(Parser, Debug)]
#[command(name = "cmdrelay")]
#[command(about = "Restricted command relay: TCP backend and HTTP gateway")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    use cmdrelay_core::ShellPolicy;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backend_args() {
        let cli = Cli::parse_from([
            "cmdrelay",
            "backend",
            "--port",
            "9100",
            "--file-root",
            "/srv/files",
            "--allowed-cmds",
            "ls, pwd",
            "--strict-shell",
            "--exec-timeout-sec",
            "0",
        ]);
        let Commands::Backend(args) = cli.command else {
            panic!("expected backend");
        };
        let config = args.to_config();

        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.file_root, std::path::PathBuf::from("/srv/files"));
        assert_eq!(config.allowed_commands.len(), 2);
        assert_eq!(config.shell_policy, ShellPolicy::Strict);
        assert_eq!(config.exec_timeout, None);
    }

    #[test]
    fn test_gateway_args() {
        let cli = Cli::parse_from([
            "cmdrelay",
            "-v",
            "gateway",
            "--http-addr",
            "127.0.0.1:8081",
            "--tcp-host",
            "tcp",
            "--max-concurrency",
            "-1",
            "--rate-rps",
            "0",
            "--io-timeout-sec",
            "0",
        ]);
        assert!(cli.verbose);
        let Commands::Gateway(args) = cli.command else {
            panic!("expected gateway");
        };
        let config = args.to_config();

        assert_eq!(config.listen_addr.port(), 8081);
        assert_eq!(config.relay.address(), "tcp:9000");
        assert_eq!(config.relay.io_timeout, Duration::from_secs(5));
        assert_eq!(config.admission.max_concurrency, -1);
        assert!(config.admission.rate_rps <= 0.0);
        assert!(config.exchange_log.is_none());
    }
}
