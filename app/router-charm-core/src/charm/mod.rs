use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    helpers::LogTarget,
    kubernetes::ResourceClient,
    reconciler::ClusterReconciler,
    relation::{GatewayRequest, RelationData, RelationDataError},
    workload::{layer::Layer, routes::apply_routes, Container, Workload},
};

use self::{
    error::CharmError,
    settings::CharmSettings,
    status::{StatusReporter, UnitStatus},
};

pub mod error;
pub mod settings;
pub mod status;

/// Lifecycle events a charm reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CharmEvent {
    Install,
    Remove,
    ContainerReady,
    RelationChanged {
        remote_unit: Option<String>,
        #[serde(default)]
        data: RelationData,
    },
}

impl CharmEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CharmEvent::Install => "install",
            CharmEvent::Remove => "remove",
            CharmEvent::ContainerReady => "container-ready",
            CharmEvent::RelationChanged { .. } => "relation-changed",
        }
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Completed,
    /// Preconditions aren't met yet, the event has to be delivered again later.
    Deferred,
    Failed(CharmError),
}

/// Maps lifecycle events onto the cluster reconciler and the workload.
pub struct Charm<C, W, S> {
    settings: CharmSettings,
    reconciler: ClusterReconciler<C>,
    workload: Workload<W>,
    status: S,
    log: LogTarget,
}

impl<C, W, S> Charm<C, W, S>
where
    C: ResourceClient,
    W: Container,
    S: StatusReporter,
{
    pub fn new(
        settings: CharmSettings,
        reconciler: ClusterReconciler<C>,
        workload: Workload<W>,
        status: S,
        log: LogTarget,
    ) -> Self {
        Self {
            settings,
            reconciler,
            workload,
            status,
            log,
        }
    }

    pub fn service_layer(&self) -> Layer {
        Layer::keep_alive(&self.settings.service_name)
    }

    pub async fn dispatch(&self, event: &CharmEvent) -> EventOutcome {
        let target = self.log.as_str();

        info!(target: target, "Handling '{}' event", event.name());

        let result = match event {
            CharmEvent::Install => self.on_install().await,
            CharmEvent::Remove => self.on_remove().await,
            CharmEvent::ContainerReady => self.on_container_ready().await,
            CharmEvent::RelationChanged { remote_unit, data } => {
                self.on_relation_changed(remote_unit.as_deref(), data).await
            }
        };

        match result {
            Ok(outcome) => {
                if let EventOutcome::Deferred = outcome {
                    info!(target: target, "'{}' event deferred", event.name());
                }
                outcome
            }
            Err(err) => {
                error!(target: target, "'{}' event failed! {err}", event.name());
                if err.needs_intervention() {
                    self.report_blocked(&err).await;
                }
                EventOutcome::Failed(err)
            }
        }
    }

    async fn on_install(&self) -> Result<EventOutcome, CharmError> {
        self.reconciler
            .ensure_network_attachment_definition(
                &self.settings.attachment_name,
                &self.settings.cni_config,
            )
            .await
            .map_err(CharmError::Reconciler)?;
        self.reconciler
            .ensure_security_context(self.settings.container_index, &self.settings.capabilities)
            .await
            .map_err(CharmError::Reconciler)?;

        self.set_status(UnitStatus::waiting(format!(
            "Waiting for {} container",
            self.settings.container_name
        )))
        .await?;

        Ok(EventOutcome::Completed)
    }

    async fn on_remove(&self) -> Result<EventOutcome, CharmError> {
        self.reconciler
            .delete_network_attachment_definition(&self.settings.attachment_name)
            .await
            .map_err(CharmError::Reconciler)?;

        Ok(EventOutcome::Completed)
    }

    async fn on_container_ready(&self) -> Result<EventOutcome, CharmError> {
        if !self.workload.can_connect().await {
            self.set_status(UnitStatus::waiting("Waiting for Pebble in workload container"))
                .await?;
            return Ok(EventOutcome::Deferred);
        }

        self.set_status(UnitStatus::maintenance(format!(
            "Configuring {} gateway",
            self.settings.container_name
        )))
        .await?;

        self.settings
            .bootstrapper()
            .run(&self.workload)
            .await
            .map_err(CharmError::Workload)?;
        self.workload
            .apply_layer(&self.settings.service_name, &self.service_layer())
            .await
            .map_err(CharmError::Workload)?;

        info!(target: self.log.as_str(), "Added updated layer '{}' to Pebble plan", self.settings.service_name);

        self.set_status(UnitStatus::Active).await?;

        Ok(EventOutcome::Completed)
    }

    async fn on_relation_changed(
        &self,
        remote_unit: Option<&str>,
        data: &RelationData,
    ) -> Result<EventOutcome, CharmError> {
        let target = self.log.as_str();

        if !self.workload.can_connect().await {
            self.set_status(UnitStatus::waiting("Waiting for Pebble in workload container"))
                .await?;
            return Ok(EventOutcome::Deferred);
        }

        let remote_unit = match remote_unit {
            Some(unit) => unit,
            None => {
                info!(target: target, "No remote unit in the '{}' relation event", self.settings.relation_name);
                return Ok(EventOutcome::Completed);
            }
        };

        let request = match GatewayRequest::from_relation_data(data) {
            Ok(request) => request,
            Err(RelationDataError::MissingField(key)) => {
                info!(target: target, "Relation data from '{remote_unit}' not yet ready, '{key}' is missing");
                return Ok(EventOutcome::Completed);
            }
            Err(err) => {
                warn!(target: target, "Ignoring relation data from '{remote_unit}'! {err}");
                return Ok(EventOutcome::Completed);
            }
        };

        self.reconciler
            .ensure_multus_annotation(&request.network_selection(&self.settings.attachment_name))
            .await
            .map_err(CharmError::Reconciler)?;

        apply_routes(&self.workload, &request.routes)
            .await
            .map_err(CharmError::Workload)?;

        Ok(EventOutcome::Completed)
    }

    async fn set_status(&self, status: UnitStatus) -> Result<(), CharmError> {
        self.status
            .set_status(&status)
            .await
            .map_err(CharmError::Status)?;

        info!(target: self.log.as_str(), "Unit status set to {status}");

        Ok(())
    }

    async fn report_blocked(&self, err: &CharmError) {
        if let Err(status_err) = self.set_status(UnitStatus::blocked(err.to_string())).await {
            warn!(target: self.log.as_str(), "{status_err}");
        }
    }
}
