use std::net::IpAddr;

use ipnet::IpNet;
use log::info;
use serde::{Deserialize, Serialize};

use super::{Container, Workload, WorkloadError};

/// Static route requested by a peer.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub network: IpNet,
    pub gateway: IpAddr,
}

impl Route {
    pub fn new(network: IpNet, gateway: IpAddr) -> Self {
        Self { network, gateway }
    }

    pub fn command(&self) -> Vec<String> {
        vec![
            "ip".to_owned(),
            "route".to_owned(),
            "add".to_owned(),
            self.network.to_string(),
            "via".to_owned(),
            self.gateway.to_string(),
        ]
    }
}

/// Adds the routes one by one, in order. The first failing route aborts the
/// rest of the batch. Nothing is recorded, re-delivering the same routes runs
/// the commands again.
pub async fn apply_routes<W: Container>(
    workload: &Workload<W>,
    routes: &[Route],
) -> Result<(), WorkloadError> {
    for route in routes {
        workload.run(&route.command()).await?;

        info!(
            target: workload.log().as_str(),
            "Successfully set ip route: {} via {}", route.network, route.gateway
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        helpers::LogTarget,
        workload::{tests::recording_container, ExecOutput, Workload, WorkloadError},
    };

    use super::{apply_routes, Route};

    fn route(network: &str, gateway: &str) -> Route {
        Route::new(network.parse().unwrap(), gateway.parse().unwrap())
    }

    #[tokio::test]
    async fn routes_are_added_in_input_order() {
        let (container, commands) = recording_container(|_| ExecOutput::success());
        let workload = Workload::new("router", container, LogTarget::WORKLOAD);
        let routes = [
            route("172.250.0.0/16", "192.168.250.3"),
            route("172.251.0.0/16", "192.168.250.5"),
        ];

        apply_routes(&workload, &routes).await.unwrap();

        assert_eq!(
            *commands.lock().unwrap(),
            vec![
                vec!["ip", "route", "add", "172.250.0.0/16", "via", "192.168.250.3"],
                vec!["ip", "route", "add", "172.251.0.0/16", "via", "192.168.250.5"],
            ]
        );
    }

    #[tokio::test]
    async fn failing_route_stops_the_batch() {
        let (container, commands) = recording_container(|command| match command[3].as_str() {
            "10.1.0.0/16" => ExecOutput::failure(2, "Error: Nexthop has invalid gateway."),
            _ => ExecOutput::success(),
        });
        let workload = Workload::new("router", container, LogTarget::WORKLOAD);
        let routes = [
            route("10.0.0.0/16", "192.168.250.3"),
            route("10.1.0.0/16", "192.168.250.4"),
            route("10.2.0.0/16", "192.168.250.5"),
        ];

        let result = apply_routes(&workload, &routes).await;

        assert!(matches!(result, Err(WorkloadError::CommandFailed { exit_code: 2, .. })));
        assert_eq!(commands.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_routes_means_no_commands() {
        let (container, commands) = recording_container(|_| ExecOutput::success());
        let workload = Workload::new("router", container, LogTarget::WORKLOAD);

        apply_routes(&workload, &[]).await.unwrap();

        assert!(commands.lock().unwrap().is_empty());
    }
}
