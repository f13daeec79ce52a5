#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use converge::tracing;
use converge_grafana::ResourceKind;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::{
    config::CONFIG_BIN,
    plan::{OutputFormat, read_document},
};

mod config;
mod plan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the changes that reconciling a desired document would make
    Plan {
        #[clap(long, help = "Resource kind, for example `folder_permissions`")]
        kind: ResourceKind,
        #[clap(
            long,
            default_value = "",
            help = "Parent the associations belong to. Ignored for global collections."
        )]
        parent: String,
        #[clap(short, long, help = "Desired associations (JSON or YAML)")]
        desired: PathBuf,
        #[clap(
            short,
            long,
            help = "Listing of the current associations (JSON or YAML). Omit if nothing exists yet."
        )]
        current: Option<PathBuf>,
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },
    /// Validate a desired document without planning against a listing
    Check {
        #[clap(long, help = "Resource kind, for example `folder_permissions`")]
        kind: ResourceKind,
        #[clap(long, default_value = "")]
        parent: String,
        #[clap(short, long, help = "Desired associations (JSON or YAML)")]
        desired: PathBuf,
    },
    /// Print the version of the binary
    Version {},
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_file(CONFIG_BIN.debug.extended_logs)
        .with_line_number(CONFIG_BIN.debug.extended_logs)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::Plan {
            kind,
            parent,
            desired,
            current,
            output,
        }) => {
            let desired = read_document(&desired)?;
            let current = current.as_deref().map(read_document).transpose()?;
            let plan = plan::plan(kind, &parent, &desired, current.as_deref())?;
            println!("{}", plan.render(output)?);
        }
        Some(Commands::Check {
            kind,
            parent,
            desired,
        }) => {
            let document = read_document(&desired)?;
            let count = plan::check(kind, &parent, &document)?;
            tracing::info!(
                kind = kind.as_str(),
                path = %desired.display(),
                associations = count,
                "Desired document is valid"
            );
        }
        Some(Commands::Version {}) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            // Error out if no subcommand is provided.
            eprintln!("No subcommand provided. Use --help for more information.");
            anyhow::bail!("No subcommand provided");
        }
    }

    Ok(())
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
    fn test_plan_arguments() {
        let cli = Cli::try_parse_from([
            "converge",
            "plan",
            "--kind",
            "folder_permissions",
            "--parent",
            "folder-uid",
            "-d",
            "desired.yaml",
            "-o",
            "yaml",
        ])
        .unwrap();
        let Some(Commands::Plan {
            kind,
            current,
            output,
            ..
        }) = cli.command
        else {
            panic!("expected the plan subcommand");
        };
        assert_eq!(kind, ResourceKind::FolderPermissions);
        assert_eq!(current, None);
        assert_eq!(output, OutputFormat::Yaml);
    }
}
