use std::{env::var, net::IpAddr, path::PathBuf};

use router_charm_core::charm::settings::{
    CharmSettings, CharmSettingsBuilder, CharmSettingsBuilderError, CharmVariant,
    UnknownVariantError,
};
use thiserror::Error;

pub const MODEL_NAME_VAR: &str = "JUJU_MODEL_NAME";
pub const UNIT_NAME_VAR: &str = "JUJU_UNIT_NAME";
pub const DISPATCH_PATH_VAR: &str = "JUJU_DISPATCH_PATH";
pub const REMOTE_UNIT_VAR: &str = "JUJU_REMOTE_UNIT";
pub const CHARM_DIR_VAR: &str = "JUJU_CHARM_DIR";
pub const VARIANT_VAR: &str = "ROUTER_CHARM_VARIANT";
pub const DEFAULT_GATEWAY_VAR: &str = "ROUTER_CHARM_DEFAULT_GATEWAY";

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Env var unavailable: {}", .0)]
    VarUnset(&'static str),
    #[error("Unit name '{}' isn't in the '<application>/<number>' form!", .0)]
    InvalidUnitName(String),
    #[error("{}", .0)]
    VariantParse(UnknownVariantError),
    #[error("IP address couldn't be parsed: {}", .0)]
    IpAddrParse(std::net::AddrParseError),
}

/// What the agent tells the charm process about itself through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharmEnvironment {
    pub model_name: String,
    pub unit_name: String,
    pub dispatch_path: Option<String>,
    pub remote_unit: Option<String>,
    pub charm_dir: PathBuf,
    pub variant: CharmVariant,
    pub default_gateway: Option<IpAddr>,
}

impl CharmEnvironment {
    pub fn from_env() -> Result<Self, FromError> {
        Self::from_lookup(|key| var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FromError> {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or(FromError::VarUnset(key))
        };
        let optional = |key: &'static str| lookup(key).filter(|value| !value.is_empty());

        let unit_name = required(UNIT_NAME_VAR)?;
        if !is_unit_name(&unit_name) {
            return Err(FromError::InvalidUnitName(unit_name));
        }

        Ok(Self {
            model_name: required(MODEL_NAME_VAR)?,
            unit_name,
            dispatch_path: optional(DISPATCH_PATH_VAR),
            remote_unit: optional(REMOTE_UNIT_VAR),
            charm_dir: required(CHARM_DIR_VAR)?.into(),
            variant: match optional(VARIANT_VAR) {
                Some(variant) => variant.parse().map_err(FromError::VariantParse)?,
                None => CharmVariant::default(),
            },
            default_gateway: match optional(DEFAULT_GATEWAY_VAR) {
                Some(ip) => Some(ip.parse().map_err(FromError::IpAddrParse)?),
                None => None,
            },
        })
    }

    /// Name of the application, which is also the name of its StatefulSet.
    pub fn app_name(&self) -> &str {
        self.unit_name
            .split_once('/')
            .map(|(app, _)| app)
            .unwrap_or(&self.unit_name)
    }

    /// Pods of the StatefulSet are named after the unit, `router/0` runs in `router-0`.
    pub fn pod_name(&self) -> String {
        self.unit_name.replace('/', "-")
    }

    pub fn settings(
        &self,
        variant: CharmVariant,
    ) -> Result<CharmSettings, CharmSettingsBuilderError> {
        let mut builder = CharmSettingsBuilder::default();
        builder.with_variant(variant);

        // quagga never routes default traffic, the override is router-only
        if let (CharmVariant::Router, Some(gateway)) = (variant, self.default_gateway) {
            builder.default_gateway(Some(gateway));
        }

        builder.build()
    }
}

fn is_unit_name(name: &str) -> bool {
    match name.split_once('/') {
        Some((app, number)) => {
            !app.is_empty() && !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
