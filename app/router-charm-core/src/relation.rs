use std::collections::BTreeMap;

use thiserror::Error;

use crate::{resources::statefulset::NetworkSelection, workload::routes::Route};

pub const INTERFACE_NAME_KEY: &str = "name";
pub const GATEWAY_KEY: &str = "gateway";
pub const ROUTES_KEY: &str = "routes";

/// Opaque key/value bag published by the remote unit.
pub type RelationData = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum RelationDataError {
    #[error("Relation data is missing the '{}' key!", .0)]
    MissingField(&'static str),
    #[error("Relation data contains invalid routes! Details: {}", .0)]
    InvalidRoutes(serde_json::Error),
}

/// What a peer asks the gateway for: an interface on the secondary network
/// and the routes reachable through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRequest {
    pub interface_name: String,
    pub gateway: String,
    pub routes: Vec<Route>,
}

impl GatewayRequest {
    /// `name` and `gateway` are required, `routes` is optional and defaults to
    /// no routes. Empty values count as missing.
    pub fn from_relation_data(data: &RelationData) -> Result<Self, RelationDataError> {
        let interface_name = require(data, INTERFACE_NAME_KEY)?;
        let gateway = require(data, GATEWAY_KEY)?;
        let routes = match data.get(ROUTES_KEY) {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(raw).map_err(RelationDataError::InvalidRoutes)?
            }
            _ => Vec::new(),
        };

        Ok(Self {
            interface_name,
            gateway,
            routes,
        })
    }

    /// The gateway address becomes the only IP of the attached interface.
    pub fn network_selection(&self, attachment_name: &str) -> NetworkSelection {
        NetworkSelection {
            name: attachment_name.to_owned(),
            interface: self.interface_name.to_owned(),
            ips: vec![self.gateway.to_owned()],
        }
    }
}

fn require(data: &RelationData, key: &'static str) -> Result<String, RelationDataError> {
    data.get(key)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or(RelationDataError::MissingField(key))
}
