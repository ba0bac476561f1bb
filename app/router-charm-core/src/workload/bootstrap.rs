use std::{fmt::Display, net::IpAddr};

use log::{info, warn};

use super::{argv, Container, Workload, WorkloadError};

pub const DEFAULT_EGRESS_INTERFACE: &str = "eth0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapStage {
    Uninitialized,
    ForwardingEnabled,
    NatConfigured,
    RouteConfigured,
    SignalsTrapped,
    Ready,
}

impl Display for BootstrapStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BootstrapStage::Uninitialized => "uninitialized",
            BootstrapStage::ForwardingEnabled => "forwarding-enabled",
            BootstrapStage::NatConfigured => "nat-configured",
            BootstrapStage::RouteConfigured => "route-configured",
            BootstrapStage::SignalsTrapped => "signals-trapped",
            BootstrapStage::Ready => "ready",
        })
    }
}

/// One-time gateway set up, re-run in full whenever the container comes up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayBootstrapper {
    egress_interface: String,
    default_gateway: Option<IpAddr>,
}

impl GatewayBootstrapper {
    pub fn new(egress_interface: impl Into<String>, default_gateway: Option<IpAddr>) -> Self {
        Self {
            egress_interface: egress_interface.into(),
            default_gateway,
        }
    }

    /// Walks `uninitialized -> forwarding-enabled -> nat-configured ->
    /// [route-configured] -> signals-trapped -> ready`. A failing step stops
    /// the walk, earlier steps aren't undone.
    pub async fn run<W: Container>(
        &self,
        workload: &Workload<W>,
    ) -> Result<BootstrapStage, WorkloadError> {
        let mut stage = BootstrapStage::Uninitialized;

        while stage != BootstrapStage::Ready {
            stage = match self.advance(workload, stage).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(target: workload.log().as_str(), "Gateway bootstrap stopped at '{stage}' stage!");
                    return Err(err);
                }
            };
        }

        Ok(stage)
    }

    async fn advance<W: Container>(
        &self,
        workload: &Workload<W>,
        stage: BootstrapStage,
    ) -> Result<BootstrapStage, WorkloadError> {
        let target = workload.log().as_str();

        match stage {
            BootstrapStage::Uninitialized => {
                workload.run(&ip_forwarding_command()).await?;
                info!(target: target, "Successfully set ip forwarding");
                Ok(BootstrapStage::ForwardingEnabled)
            }
            BootstrapStage::ForwardingEnabled => {
                self.ensure_masquerade(workload).await?;
                info!(target: target, "Successfully set ip tables");
                Ok(BootstrapStage::NatConfigured)
            }
            BootstrapStage::NatConfigured => match self.default_gateway {
                Some(gateway) => {
                    workload.run(&default_route_command(gateway)).await?;
                    info!(target: target, "Successfully set default route via {gateway}");
                    Ok(BootstrapStage::RouteConfigured)
                }
                None => self.trap_signals(workload).await,
            },
            BootstrapStage::RouteConfigured => self.trap_signals(workload).await,
            BootstrapStage::SignalsTrapped | BootstrapStage::Ready => Ok(BootstrapStage::Ready),
        }
    }

    async fn trap_signals<W: Container>(
        &self,
        workload: &Workload<W>,
    ) -> Result<BootstrapStage, WorkloadError> {
        workload.run(&trap_signals_command()).await?;
        info!(target: workload.log().as_str(), "Successfully set trap signals");

        Ok(BootstrapStage::SignalsTrapped)
    }

    /// The rule is checked before it's appended, so restarts don't stack
    /// duplicate rules.
    async fn ensure_masquerade<W: Container>(
        &self,
        workload: &Workload<W>,
    ) -> Result<(), WorkloadError> {
        if workload
            .probe(&masquerade_command("-C", &self.egress_interface))
            .await?
        {
            info!(target: workload.log().as_str(), "Masquerade rule on {} already present", self.egress_interface);
            return Ok(());
        }

        workload
            .run(&masquerade_command("-A", &self.egress_interface))
            .await
            .map(|_| ())
    }
}

impl Default for GatewayBootstrapper {
    fn default() -> Self {
        Self::new(DEFAULT_EGRESS_INTERFACE, None)
    }
}

pub fn ip_forwarding_command() -> Vec<String> {
    argv(&["sysctl", "-w", "net.ipv4.ip_forward=1"])
}

pub fn masquerade_command(action: &str, interface: &str) -> Vec<String> {
    argv(&[
        "iptables",
        "-t",
        "nat",
        action,
        "POSTROUTING",
        "-o",
        interface,
        "-j",
        "MASQUERADE",
    ])
}

pub fn default_route_command(gateway: IpAddr) -> Vec<String> {
    vec![
        "ip".to_owned(),
        "route".to_owned(),
        "replace".to_owned(),
        "default".to_owned(),
        "via".to_owned(),
        gateway.to_string(),
    ]
}

/// `trap` is a shell builtin, so it has to go through bash.
pub fn trap_signals_command() -> Vec<String> {
    argv(&["/bin/bash", "-c", "trap : TERM INT"])
}
