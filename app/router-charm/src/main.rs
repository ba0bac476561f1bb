use anyhow::{anyhow, Context};
use clap::Parser;
use cli::{Commands, EmitArgs, EventKind, GlobalArgs, LogLevel};
use config::CharmEnvironment;
use container::KubeContainer;
use deferred::{drain, DeferredEvents};
use dispatch::{parse_dispatch_path, HookKind};
use env_logger::Target;
use hook_tools::{relation_get, JujuStatus};
use kube::Client;
use log::{info, LevelFilter};
use router_charm_core::{
    charm::{settings::CharmSettings, Charm, CharmEvent},
    helpers::LogTarget,
    kubernetes::client::KubeResourceClient,
    reconciler::ClusterReconciler,
    relation::RelationData,
    workload::{layer::Layer, Workload},
    DEFAULT_FIELD_MANAGER,
};

use crate::cli::Cli;

mod cli;
mod config;
mod container;
mod deferred;
mod dispatch;
mod hook_tools;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    configure_logging(&cli.global_args);

    let command = cli.command.unwrap_or(Commands::Dispatch);

    if let Commands::RenderLayer = command {
        let variant = cli.global_args.variant.unwrap_or_default();
        let settings =
            CharmSettings::for_variant(variant).context("Couldn't build the charm settings!")?;
        let rendered = Layer::keep_alive(&settings.service_name)
            .to_yaml()
            .context("Couldn't render the service layer!")?;
        print!("{rendered}");

        return Ok(());
    }

    let env = CharmEnvironment::from_env().context("Couldn't read the charm environment!")?;
    let variant = cli.global_args.variant.unwrap_or(env.variant);
    let settings = env
        .settings(variant)
        .context("Couldn't build the charm settings!")?;

    let event = match command {
        Commands::Emit(args) => Some(emitted_event(args)),
        _ => delivered_event(&env, &settings).await?,
    };

    run(env, settings, event).await
}

async fn run(
    env: CharmEnvironment,
    settings: CharmSettings,
    event: Option<CharmEvent>,
) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("Couldn't initialize k8s API client!")?;

    let reconciler = ClusterReconciler::new(
        KubeResourceClient::new(client.clone(), DEFAULT_FIELD_MANAGER),
        env.model_name.as_str(),
        env.app_name(),
        LogTarget::CLUSTER,
    );
    let workload = Workload::new(
        settings.container_name.to_owned(),
        KubeContainer::new(
            client,
            &env.model_name,
            env.pod_name(),
            settings.container_name.to_owned(),
        ),
        LogTarget::WORKLOAD,
    );
    let charm = Charm::new(settings, reconciler, workload, JujuStatus, LogTarget::CHARM);

    let store = DeferredEvents::in_dir(&env.charm_dir);
    let deferred = store
        .load()
        .await
        .context("Couldn't load deferred events!")?;

    let charm = &charm;
    let result = drain(deferred, event, move |event| async move {
        let outcome = charm.dispatch(&event).await;
        (event, outcome)
    })
    .await;

    store
        .save(&result.pending)
        .await
        .context("Couldn't store deferred events!")?;

    match result.failure {
        Some(err) => Err(err).context("Event handling failed!"),
        None => Ok(()),
    }
}

/// Turns the hook the agent invoked us for into an event. Hooks the charm
/// doesn't handle still get deferred events re-emitted.
async fn delivered_event(
    env: &CharmEnvironment,
    settings: &CharmSettings,
) -> anyhow::Result<Option<CharmEvent>> {
    let path = env
        .dispatch_path
        .as_deref()
        .ok_or_else(|| anyhow!("JUJU_DISPATCH_PATH is unset, nothing to dispatch!"))?;

    let event = match parse_dispatch_path(path, settings) {
        HookKind::Install => CharmEvent::Install,
        HookKind::Remove => CharmEvent::Remove,
        HookKind::ContainerReady => CharmEvent::ContainerReady,
        HookKind::RelationChanged => CharmEvent::RelationChanged {
            data: match &env.remote_unit {
                Some(unit) => relation_get(unit)
                    .await
                    .context("Couldn't read relation data!")?,
                None => RelationData::new(),
            },
            remote_unit: env.remote_unit.to_owned(),
        },
        HookKind::Ignored(hook) => {
            info!("Nothing to do for '{hook}' hook");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn emitted_event(args: EmitArgs) -> CharmEvent {
    match args.event {
        EventKind::Install => CharmEvent::Install,
        EventKind::Remove => CharmEvent::Remove,
        EventKind::ContainerReady => CharmEvent::ContainerReady,
        EventKind::RelationChanged => CharmEvent::RelationChanged {
            remote_unit: args.remote_unit,
            data: args.data.into_iter().collect(),
        },
    }
}

fn configure_logging(global_args: &GlobalArgs) {
    let log_level = global_args.get_log_level();
    let mut logger = env_logger::builder();

    logger
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Trace))
        .target(Target::Stderr);

    if let LogLevel::Normal = log_level {
        logger.filter(Some("router_charm"), LevelFilter::Info);
    }

    if let LogLevel::Verbose = log_level {
        logger.filter(Some("router_charm"), LevelFilter::Debug);
    }

    if let LogLevel::Trace = log_level {
        logger.filter(None, LevelFilter::Debug);
    }

    logger.init();
}
