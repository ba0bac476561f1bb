use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const KEEP_ALIVE_COMMAND: &str = "sleep infinity";

/// Service layer handed to the workload supervisor.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Service {
    #[serde(rename = "override")]
    pub override_mode: Override,
    pub startup: Startup,
    pub command: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    Merge,
    Replace,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    Enabled,
    Disabled,
}

impl Layer {
    /// The gateway behaviour comes from one-shot exec calls, the declared
    /// service only keeps the container alive.
    pub fn keep_alive(service_name: &str) -> Self {
        Self {
            summary: Some(format!("{service_name} layer")),
            description: Some(format!("pebble config layer for {service_name}")),
            services: BTreeMap::from([(
                service_name.to_owned(),
                Service {
                    override_mode: Override::Replace,
                    startup: Startup::Enabled,
                    command: KEEP_ALIVE_COMMAND.to_owned(),
                },
            )]),
        }
    }

    /// The layer as the supervisor plan reports it, without summary and description.
    pub fn plan(&self) -> Self {
        Self {
            services: self.services.clone(),
            ..Default::default()
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
