use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr},
    str::FromStr,
};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    resources::network_attachment::{CniConfig, NETWORK_ATTACHMENT_DEFINITION_NAME},
    workload::bootstrap::{GatewayBootstrapper, DEFAULT_EGRESS_INTERFACE},
};

pub const ROUTER_NAME: &str = "router";
pub const WORKLOAD_CONTAINER_INDEX: usize = 1;
pub const NET_ADMIN_CAPABILITY: &str = "NET_ADMIN";
pub const ROUTER_DEFAULT_GATEWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 250, 1));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CharmVariant {
    #[default]
    Router,
    Quagga,
}

#[derive(Debug, Error)]
#[error("'{}' is not a known charm variant! Expected 'router' or 'quagga'.", .0)]
pub struct UnknownVariantError(String);

impl FromStr for CharmVariant {
    type Err = UnknownVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "router" => Ok(CharmVariant::Router),
            "quagga" => Ok(CharmVariant::Quagga),
            _ => Err(UnknownVariantError(s.to_owned())),
        }
    }
}

impl Display for CharmVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CharmVariant::Router => "router",
            CharmVariant::Quagga => "quagga",
        })
    }
}

/// Names and knobs a charm instance works with.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct CharmSettings {
    #[builder(default = "ROUTER_NAME.to_owned()")]
    pub container_name: String,
    #[builder(default = "ROUTER_NAME.to_owned()")]
    pub service_name: String,
    #[builder(default = "ROUTER_NAME.to_owned()")]
    pub relation_name: String,
    #[builder(default = "NETWORK_ATTACHMENT_DEFINITION_NAME.to_owned()")]
    pub attachment_name: String,
    #[builder(default = "WORKLOAD_CONTAINER_INDEX")]
    pub container_index: usize,
    #[builder(default = "vec![NET_ADMIN_CAPABILITY.to_owned()]")]
    pub capabilities: Vec<String>,
    #[builder(default)]
    pub cni_config: CniConfig,
    #[builder(default = "DEFAULT_EGRESS_INTERFACE.to_owned()")]
    pub egress_interface: String,
    #[builder(default)]
    pub default_gateway: Option<IpAddr>,
}

impl CharmSettingsBuilder {
    /// Seeds the builder with what distinguishes the variants. Only the router
    /// sends its default traffic through the secondary network.
    pub fn with_variant(&mut self, variant: CharmVariant) -> &mut Self {
        match variant {
            CharmVariant::Router => self.default_gateway(Some(ROUTER_DEFAULT_GATEWAY)),
            CharmVariant::Quagga => self.default_gateway(None::<IpAddr>),
        }
    }
}

impl CharmSettings {
    pub fn for_variant(variant: CharmVariant) -> Result<Self, CharmSettingsBuilderError> {
        CharmSettingsBuilder::default().with_variant(variant).build()
    }

    pub fn bootstrapper(&self) -> GatewayBootstrapper {
        GatewayBootstrapper::new(self.egress_interface.to_owned(), self.default_gateway)
    }
}
