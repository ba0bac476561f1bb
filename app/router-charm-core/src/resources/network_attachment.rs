use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const NETWORK_ATTACHMENT_DEFINITION_NAME: &str = "router-net";

pub const CNI_VERSION: &str = "0.3.1";
pub const MACVLAN_PLUGIN: &str = "macvlan";
pub const STATIC_IPAM: &str = "static";

/// Secondary network description consumed by Multus.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    namespaced
)]
pub struct NetworkAttachmentDefinitionSpec {
    /// serialized CNI configuration
    pub config: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CniConfig {
    pub cni_version: String,
    #[serde(rename = "type")]
    pub plugin: String,
    pub ipam: IpamConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IpamConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CniConfig {
    pub fn macvlan_static() -> Self {
        Self {
            cni_version: CNI_VERSION.to_owned(),
            plugin: MACVLAN_PLUGIN.to_owned(),
            ipam: IpamConfig {
                kind: STATIC_IPAM.to_owned(),
            },
        }
    }

    pub fn to_definition(
        &self,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, serde_json::Error> {
        let spec = NetworkAttachmentDefinitionSpec {
            config: serde_json::to_string(self)?,
        };

        Ok(NetworkAttachmentDefinition::new(name, spec))
    }
}

impl Default for CniConfig {
    fn default() -> Self {
        Self::macvlan_static()
    }
}

#[cfg(test)]
mod tests {
    use kube::Resource;

    use super::{CniConfig, NetworkAttachmentDefinition};

    #[test]
    fn macvlan_config_serializes_in_cni_format() {
        let config = serde_json::to_string(&CniConfig::macvlan_static()).unwrap();

        assert_eq!(
            config,
            r#"{"cniVersion":"0.3.1","type":"macvlan","ipam":{"type":"static"}}"#
        );
    }

    #[test]
    fn definition_carries_name_and_config() {
        let definition = CniConfig::macvlan_static()
            .to_definition("router-net")
            .unwrap();
        let parsed: CniConfig = serde_json::from_str(&definition.spec.config).unwrap();

        assert_eq!(definition.metadata.name.as_deref(), Some("router-net"));
        assert_eq!(parsed, CniConfig::macvlan_static());
    }

    #[test]
    fn definition_targets_multus_api() {
        assert_eq!(NetworkAttachmentDefinition::group(&()), "k8s.cni.cncf.io");
        assert_eq!(NetworkAttachmentDefinition::version(&()), "v1");
        assert_eq!(
            NetworkAttachmentDefinition::plural(&()),
            "network-attachment-definitions"
        );
    }
}
