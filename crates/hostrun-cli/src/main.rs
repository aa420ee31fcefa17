//! hostrun CLI
//!
//! Runs commands, argument vectors and expect scripts on a local or remote
//! host and exits with the command's return code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use hostrun_exec::{Connection, ExpectOptions, HostDescriptor, LogLevel, ProcessResult, RunOptions};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "hostrun")]
#[command(about = "Run commands on local and remote hosts", long_about = None)]
struct Cli {
    /// Host name from the config file, or an address
    #[arg(long, global = true, default_value = "localhost")]
    host: String,

    /// Config file with `[[host]]` entries
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SSH user for hosts not in the config file
    #[arg(long, global = true, default_value = "root")]
    user: String,

    /// SSH port for hosts not in the config file
    #[arg(long, global = true, default_value_t = 22)]
    port: u16,

    /// SSH private key for hosts not in the config file
    #[arg(long, global = true)]
    key: Option<String>,

    /// Shell for hosts not in the config file (bash, sh, powershell)
    #[arg(long, global = true, default_value = "bash")]
    shell: String,

    /// Process log level (silent, short, full, error)
    #[arg(long, global = true, default_value = "full")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct CommandArgs {
    /// Working directory
    #[arg(long)]
    cwd: Option<String>,

    /// Extra environment variable, `KEY=VALUE`
    #[arg(long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Content written to standard input
    #[arg(long)]
    input: Option<String>,
}

impl CommandArgs {
    fn options(self, log_level: LogLevel) -> RunOptions {
        let mut options = RunOptions::default()
            .with_log_level(log_level)
            .with_raise_on_error(false);
        if let Some(cwd) = self.cwd {
            options = options.with_cwd(cwd);
        }
        if let Some(input) = self.input {
            options = options.with_input(input);
        }
        for (key, value) in self.env {
            options = options.with_env(key, value);
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script in the host's shell
    Run {
        /// Script to run
        script: String,
        #[command(flatten)]
        args: CommandArgs,
    },
    /// Run an argument vector, each argument quoted
    Exec {
        /// Program and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
        #[command(flatten)]
        args: CommandArgs,
    },
    /// Run an expect script
    Expect {
        /// File with the expect script
        file: PathBuf,
        /// Run as user nobody
        #[arg(long)]
        nobody: bool,
        /// Disable expect debug output
        #[arg(long)]
        quiet: bool,
    },
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s}"))?;
    Ok((key.to_string(), value.to_string()))
}

/// Build the connection for the selected host
fn connection(cli: &Cli) -> Result<Connection> {
    let config = match &cli.config {
        Some(path) => Some(Config::load(path)?),
        None => Config::load_default()?,
    };

    if let Some(entry) = config.as_ref().and_then(|c| c.find(&cli.host)) {
        return Ok(Connection::from_confdict(&entry.descriptor(), &entry.connection)?);
    }

    let host = HostDescriptor::new(&cli.host, &cli.host);
    let confdict = if cli.host == "localhost" || cli.host == "127.0.0.1" {
        json!({ "type": "local", "shell": cli.shell })
    } else {
        json!({
            "type": "ssh",
            "user": cli.user,
            "port": cli.port,
            "ssh_key": cli.key,
            "shell": cli.shell,
        })
    };

    Ok(Connection::from_confdict(&host, &confdict)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let conn = connection(&cli)?;
    let log_level = cli.log_level;

    let result: ProcessResult = conn
        .scoped(|conn| async move {
            match cli.command {
                Commands::Run { script, args } => conn.run(&script, args.options(log_level)).await,
                Commands::Exec { argv, args } => conn.exec(argv, args.options(log_level)).await,
                Commands::Expect {
                    file,
                    nobody,
                    quiet,
                } => {
                    let script = tokio::fs::read_to_string(&file).await?;
                    let options = ExpectOptions {
                        verbose: !quiet,
                        raise_on_error: false,
                    };
                    if nobody {
                        conn.expect_nobody(&script, options).await
                    } else {
                        conn.expect(&script, options).await
                    }
                }
            }
        })
        .await?;

    if !result.stdout().is_empty() {
        println!("{}", result.stdout());
    }
    if !result.stderr().is_empty() {
        eprintln!("{}", result.stderr());
    }

    std::process::exit(result.rc());
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_env() {
        assert_eq!(
            parse_env("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_env("novalue").is_err());
    }

    #[test]
    fn test_exec_args() {
        let cli = Cli::parse_from([
            "hostrun", "--log-level", "short", "exec", "--cwd", "/tmp", "ls", "-la",
        ]);

        assert_eq!(cli.log_level, LogLevel::Short);
        match cli.command {
            Commands::Exec { argv, args } => {
                assert_eq!(argv, ["ls", "-la"]);
                assert_eq!(args.cwd.as_deref(), Some("/tmp"));
            }
            _ => panic!("expected exec"),
        }
    }

    #[tokio::test]
    async fn test_local_connection() {
        let cli = Cli::parse_from(["hostrun", "--shell", "sh", "run", "echo hi"]);
        let conn = connection(&cli).unwrap();

        assert_eq!(conn.transport().transport_type(), "local");
        let result = conn.run("echo hi", RunOptions::default()).await.unwrap();
        assert_eq!(result.stdout(), "hi");
    }
}
