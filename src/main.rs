mod applications;
mod client;
mod config;
mod error;
mod response;
mod table;

use crate::applications::{Action, OutputFormat, Request};
use crate::client::{Connection, UploadEncoding};
use crate::config::{Config, Scope, save};
use crate::error::CommandError;
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser)]
#[command(
    name = "dmctl",
    version,
    about = "CLI for the dm cluster management API",
    after_help = "Settings can also be stored with `dmctl configure` (./.dmctl.yaml or the user config dir)."
)]
struct Cli {
    #[arg(
        long,
        short = 's',
        global = true,
        value_name = "HOST",
        help = "Host of the dm server (defaults to localhost)"
    )]
    server: Option<String>,

    #[arg(
        long,
        short = 'p',
        global = true,
        help = "Port of the dm server (defaults to 8761)"
    )]
    port: Option<u16>,

    #[arg(long, short = 'u', global = true, help = "Username for dm")]
    login: Option<String>,

    #[arg(long, global = true, help = "Password for dm")]
    password: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        default_value_t = client::DEFAULT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Request timeout"
    )]
    timeout: u64,

    #[arg(
        long,
        short = 'l',
        global = true,
        value_name = "LEVEL",
        help = "Log level or filter (overrides RUST_LOG)"
    )]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List, add, stop, start or remove the applications of a cluster
    Applications(ApplicationsArgs),
    /// Persist connection settings to the chosen scope
    Configure {
        #[arg(long)]
        cluster: Option<String>,
        #[arg(long, value_name = "COL1,COL2")]
        columns: Option<String>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (password masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Args)]
#[command(after_help = "Examples:
  dmctl applications --cluster=dev
  dmctl applications add --cluster=dev --application=pythonApp --file=/home/user/compose.yaml
  dmctl applications stop --cluster=dev --application=pythonApp
  dmctl applications rm --cluster=dev --application=pythonApp")]
struct ApplicationsArgs {
    #[arg(value_enum, default_value_t = Action::List)]
    action: Action,

    #[arg(long, short = 'c', help = "Cluster name")]
    cluster: Option<String>,

    #[arg(long, short = 'a', help = "Application name")]
    application: Option<String>,

    #[arg(long, value_name = "PATH", help = "Compose file for `add`")]
    file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "COL1,COL2",
        help = "Columns to show; `outer.inner` reads a nested field (defaults to name,cluster,initFile,containers)"
    )]
    columns: Option<String>,

    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    #[arg(
        long = "upload-as",
        value_enum,
        default_value_t = UploadArg::Raw,
        help = "How `add` sends the compose file"
    )]
    upload: UploadArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum UploadArg {
    Raw,
    Multipart,
}

impl From<UploadArg> for UploadEncoding {
    fn from(value: UploadArg) -> Self {
        match value {
            UploadArg::Raw => UploadEncoding::Raw,
            UploadArg::Multipart => UploadEncoding::Multipart,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<CommandError>() {
            // Remote rejections and usage hints are reported, not failures.
            Some(reported) if !reported.is_failure() => {
                println!("{reported}");
                ExitCode::SUCCESS
            }
            _ => {
                eprintln!("Error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
        }
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let overrides = Config {
        server: cli.server,
        port: cli.port,
        login: cli.login,
        password: cli.password,
        cluster: None,
        columns: None,
    };

    match cli.command {
        Commands::Applications(args) => {
            let options = config::resolve(
                &cwd,
                Config {
                    cluster: args.cluster,
                    columns: args.columns,
                    ..overrides
                },
            )?;
            let request = Request {
                action: args.action,
                cluster: options.cluster,
                application: args.application,
                file: args.file,
                columns: options.columns,
                output: args.output,
                upload: args.upload.into(),
            };

            let mut conn = Connection::new(options.target, Duration::from_secs(cli.timeout));
            let mut stdout = io::stdout().lock();
            applications::run(&mut conn, &request, &mut stdout)?;
        }
        Commands::Configure {
            cluster,
            columns,
            scope,
        } => {
            let existing = config::load_scope(scope.into(), &cwd)?;
            let updated = config::merge(
                existing,
                Config {
                    cluster,
                    columns,
                    ..overrides
                },
            );
            let path = save(scope.into(), &updated, &cwd)?;
            println!("Saved configuration to {}", path.display());
        }
        Commands::ConfigShow => {
            let mut masked = config::load(&cwd)?;
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut io::stdout())
                }
                CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut io::stdout())
                }
            }
        }
    }

    Ok(())
}
