use std::collections::BTreeMap;

use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{Capabilities, Container, SecurityContext},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ResourceViewError;

pub const MULTUS_NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// Single entry of the Multus network selection annotation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct NetworkSelection {
    /// name of the NetworkAttachmentDefinition
    pub name: String,
    /// interface name inside the pod
    pub interface: String,
    /// addresses assigned to the interface
    pub ips: Vec<String>,
}

/// The part of a StatefulSet pod template the charm reads and patches:
/// container security contexts and pod template annotations.
#[derive(Debug, Clone)]
pub struct PodTemplateView {
    containers: Vec<Container>,
    annotations: BTreeMap<String, String>,
}

impl PodTemplateView {
    pub fn from_statefulset(statefulset: &StatefulSet) -> Result<Self, ResourceViewError> {
        let template = &statefulset
            .spec
            .as_ref()
            .ok_or_else(|| ResourceViewError::MissingData("spec".into()))?
            .template;
        let pod_spec = template
            .spec
            .as_ref()
            .ok_or_else(|| ResourceViewError::MissingData("spec.template.spec".into()))?;
        let annotations = template
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.annotations.clone())
            .unwrap_or_default();

        Ok(Self {
            containers: pod_spec.containers.clone(),
            annotations,
        })
    }

    pub fn security_context(
        &self,
        index: usize,
    ) -> Result<Option<&SecurityContext>, ResourceViewError> {
        Ok(self.container(index)?.security_context.as_ref())
    }

    pub fn is_privileged_with(
        &self,
        index: usize,
        capabilities: &[String],
    ) -> Result<bool, ResourceViewError> {
        let context = match self.security_context(index)? {
            Some(context) => context,
            None => return Ok(false),
        };

        if context.privileged != Some(true) {
            return Ok(false);
        }

        let added = context
            .capabilities
            .as_ref()
            .and_then(|capabilities| capabilities.add.as_deref())
            .unwrap_or_default();

        Ok(capabilities
            .iter()
            .all(|capability| added.contains(capability)))
    }

    /// Marks the container as privileged and adds the missing capabilities,
    /// keeping the ones already present.
    pub fn grant_privileged(
        &mut self,
        index: usize,
        capabilities: &[String],
    ) -> Result<(), ResourceViewError> {
        let container = self.container_mut(index)?;
        let context = container
            .security_context
            .get_or_insert_with(SecurityContext::default);

        context.privileged = Some(true);

        let granted = context
            .capabilities
            .get_or_insert_with(Capabilities::default)
            .add
            .get_or_insert_with(Vec::new);

        for capability in capabilities {
            if !granted.contains(capability) {
                granted.push(capability.to_owned());
            }
        }

        Ok(())
    }

    /// Decodes the Multus annotation, an absent key is an empty selection list.
    /// Entries are kept as raw JSON so fields this charm doesn't know about
    /// survive a rewrite.
    pub fn network_selections(&self) -> Result<Vec<Value>, ResourceViewError> {
        match self.annotations.get(MULTUS_NETWORKS_ANNOTATION) {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map_err(|_| {
                ResourceViewError::InvalidData(
                    format!("{MULTUS_NETWORKS_ANNOTATION} annotation").into(),
                )
            }),
            _ => Ok(Vec::new()),
        }
    }

    pub fn has_network_selection(
        &self,
        selection: &NetworkSelection,
    ) -> Result<bool, ResourceViewError> {
        let encoded = encode_selection(selection)?;

        Ok(self.network_selections()?.contains(&encoded))
    }

    /// Appends the selection unless an identical one is already present.
    /// Returns whether the annotation changed.
    pub fn append_network_selection(
        &mut self,
        selection: &NetworkSelection,
    ) -> Result<bool, ResourceViewError> {
        let encoded = encode_selection(selection)?;
        let mut selections = self.network_selections()?;

        if selections.contains(&encoded) {
            return Ok(false);
        }

        selections.push(encoded);

        let annotation = serde_json::to_string(&selections)
            .map_err(|err| ResourceViewError::InvalidData(err.to_string().into()))?;
        self.annotations
            .insert(MULTUS_NETWORKS_ANNOTATION.to_owned(), annotation);

        Ok(true)
    }

    /// Merge patch replacing the pod template container list.
    pub fn containers_patch(&self) -> Value {
        json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": self.containers
                    }
                }
            }
        })
    }

    /// Merge patch setting the Multus annotation only.
    pub fn network_selections_patch(&self) -> Value {
        json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            MULTUS_NETWORKS_ANNOTATION: self.annotations.get(MULTUS_NETWORKS_ANNOTATION)
                        }
                    }
                }
            }
        })
    }

    fn container(&self, index: usize) -> Result<&Container, ResourceViewError> {
        let count = self.containers.len();

        self.containers
            .get(index)
            .ok_or(ResourceViewError::ContainerIndexOutOfRange { index, count })
    }

    fn container_mut(&mut self, index: usize) -> Result<&mut Container, ResourceViewError> {
        let count = self.containers.len();

        self.containers
            .get_mut(index)
            .ok_or(ResourceViewError::ContainerIndexOutOfRange { index, count })
    }
}

fn encode_selection(selection: &NetworkSelection) -> Result<Value, ResourceViewError> {
    serde_json::to_value(selection)
        .map_err(|err| ResourceViewError::InvalidData(err.to_string().into()))
}
