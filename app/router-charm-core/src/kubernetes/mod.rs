use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::resources::network_attachment::NetworkAttachmentDefinition;

pub mod client;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Resource was not found on the cluster!")]
    NotFound,
    #[error("Resource kind is not served by the cluster! Details: {}", .0)]
    ResourceTypeMissing(String),
    #[error("Kubernetes API request failed! Reason: {}", .0)]
    Api(kube::Error),
}

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => match response.reason.as_str() {
                // the API server reports a missing object with a proper Status,
                // a kind that isn't served comes back as a bare 404 page
                "NotFound" => ClientError::NotFound,
                _ => ClientError::ResourceTypeMissing(response.message),
            },
            error => ClientError::Api(error),
        }
    }
}

/// Cluster operations the reconciler needs. Everything is scoped to a namespace.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get_network_attachment_definition(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, ClientError>;

    async fn create_network_attachment_definition(
        &self,
        namespace: &str,
        definition: &NetworkAttachmentDefinition,
    ) -> Result<(), ClientError>;

    async fn delete_network_attachment_definition(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError>;

    async fn get_statefulset(&self, namespace: &str, name: &str)
        -> Result<StatefulSet, ClientError>;

    /// Sends a JSON merge patch to the StatefulSet.
    async fn merge_patch_statefulset(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use kube::core::ErrorResponse;

    use super::ClientError;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_owned(),
            message: "boom".to_owned(),
            reason: reason.to_owned(),
            code,
        })
    }

    #[test]
    fn missing_object_maps_to_not_found() {
        assert!(matches!(
            ClientError::from(api_error(404, "NotFound")),
            ClientError::NotFound
        ));
    }

    #[test]
    fn unparsed_404_maps_to_missing_resource_type() {
        assert!(matches!(
            ClientError::from(api_error(404, "Failed to parse error data")),
            ClientError::ResourceTypeMissing(_)
        ));
    }

    #[test]
    fn other_api_failures_stay_api_errors() {
        assert!(matches!(
            ClientError::from(api_error(403, "Forbidden")),
            ClientError::Api(_)
        ));
    }
}
