use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use sockwarden_core::error::exit_code_for;
use sockwarden_core::logging::init_tracing;

mod commands;
mod launcher;

use launcher::Tool;

#[derive(Parser, Debug)]
#[command(
    name = "sockwarden",
    version,
    about = "Risk-gated npm and npx installs backed by Socket"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run npm, gating anything that changes installed packages
    Npm {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run npx, gating the packages it would fetch
    Npx {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    Shims {
        #[command(subcommand)]
        action: ShimsCommand,
    },
    /// Shell aliases for npm and npx in ~/.bashrc and ~/.zshrc
    Wrapper {
        #[command(subcommand)]
        action: WrapperCommand,
    },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ShimsCommand {
    /// Write npm/npx shims into the shim directory
    Install,
}

#[derive(Subcommand, Debug)]
enum WrapperCommand {
    Enable,
    Disable,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    Print,
}

fn main() {
    init_tracing();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("sockwarden: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let mut argv = std::env::args();
    let arg0 = argv.next().unwrap_or_default();
    if let Some(tool) = launcher::invoked_as(&arg0) {
        return commands::launch::execute(commands::launch::LaunchInputs {
            config_path: None,
            tool,
            args: argv.collect(),
        });
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Npm { args } => commands::launch::execute(commands::launch::LaunchInputs {
            config_path: cli.config,
            tool: Tool::Npm,
            args,
        }),
        Commands::Npx { args } => commands::launch::execute(commands::launch::LaunchInputs {
            config_path: cli.config,
            tool: Tool::Npx,
            args,
        }),
        Commands::Shims { action } => match action {
            ShimsCommand::Install => commands::shims::install(cli.config),
        },
        Commands::Wrapper { action } => {
            let action = match action {
                WrapperCommand::Enable => commands::wrapper::WrapperAction::Enable,
                WrapperCommand::Disable => commands::wrapper::WrapperAction::Disable,
            };
            commands::wrapper::execute(action)
        }
        Commands::Config { action } => match action {
            ConfigCommand::Init { path, force } => {
                commands::config::init(path.or(cli.config), force)
            }
            ConfigCommand::Print => commands::config::print_effective(cli.config),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npm_args_pass_through_verbatim() {
        let cli =
            Cli::try_parse_from(["sockwarden", "npm", "install", "--save-dev", "-E", "left-pad"])
                .unwrap();
        match cli.command {
            Commands::Npm { args } => {
                assert_eq!(args, vec!["install", "--save-dev", "-E", "left-pad"])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_config_before_subcommand() {
        let cli =
            Cli::try_parse_from(["sockwarden", "--config", "/tmp/c.toml", "npx", "-y", "cowsay"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Npx { ref args } if args == &["-y", "cowsay"]));
    }
}
