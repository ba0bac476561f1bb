use clap::{Args, Parser, Subcommand, ValueEnum};
use router_charm_core::charm::settings::CharmVariant;

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// charm variant to run as (overrides ROUTER_CHARM_VARIANT)
    #[arg(long, global = true)]
    pub variant: Option<CharmVariant>,
    /// enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose_logging: bool,
    /// enable trace output (more detailed than verbose, overrides it if present)
    #[arg(long = "trace", global = true)]
    pub trace_logging: bool,
}

impl GlobalArgs {
    pub fn get_log_level(&self) -> LogLevel {
        if self.trace_logging {
            return LogLevel::Trace;
        }

        if self.verbose_logging {
            return LogLevel::Verbose;
        }

        LogLevel::Normal
    }
}

pub enum LogLevel {
    Normal,
    Verbose,
    Trace,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// handle the hook named by JUJU_DISPATCH_PATH (the default)
    #[command(alias = "d")]
    Dispatch,
    /// handle a single event regardless of the dispatch path
    #[command(alias = "e")]
    Emit(EmitArgs),
    /// print the workload service layer
    RenderLayer,
}

#[derive(Debug, Args)]
pub struct EmitArgs {
    /// event to handle
    pub event: EventKind,
    /// remote unit of a relation event
    #[arg(long)]
    pub remote_unit: Option<String>,
    /// relation data entry as key=value, may be repeated
    #[arg(long = "data", value_parser = parse_key_value)]
    pub data: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventKind {
    Install,
    Remove,
    ContainerReady,
    RelationChanged,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_owned(), value.to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("'{raw}' isn't a key=value pair"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use router_charm_core::charm::settings::CharmVariant;

    use super::{Cli, Commands, EventKind};

    #[test]
    fn no_subcommand_means_dispatch() {
        let cli = Cli::try_parse_from(["router-charm"]).unwrap();

        assert!(cli.command.is_none());
        assert!(cli.global_args.variant.is_none());
    }

    #[test]
    fn emit_collects_relation_data() {
        let cli = Cli::try_parse_from([
            "router-charm",
            "--variant",
            "quagga",
            "emit",
            "relation-changed",
            "--remote-unit",
            "quagga/0",
            "--data",
            "name=eth1",
            "--data",
            "gateway=1.2.3.4/24",
        ])
        .unwrap();

        assert_eq!(cli.global_args.variant, Some(CharmVariant::Quagga));
        match cli.command {
            Some(Commands::Emit(args)) => {
                assert_eq!(args.event, EventKind::RelationChanged);
                assert_eq!(args.remote_unit.as_deref(), Some("quagga/0"));
                assert_eq!(
                    args.data,
                    vec![
                        ("name".to_owned(), "eth1".to_owned()),
                        ("gateway".to_owned(), "1.2.3.4/24".to_owned())
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_data_is_rejected() {
        let result = Cli::try_parse_from(["router-charm", "emit", "install", "--data", "name"]);

        assert!(result.is_err());
    }
}
