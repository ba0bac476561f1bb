use std::borrow::Cow;

use thiserror::Error;

use crate::{kubernetes::ClientError, resources::ResourceViewError};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("NetworkAttachmentDefinition resource is not served by the cluster! You may need to install Multus CNI.")]
    MultusNotInstalled,
    #[error("'{}' resource was not found!", .0)]
    MissingObject(Cow<'static, str>),
    #[error("Couldn't prepare the resource! Reason: {}", .0)]
    ResourceView(ResourceViewError),
    #[error("Couldn't serialize the resource! Reason: {}", .0)]
    Serialization(serde_json::Error),
    #[error("Couldn't reconcile the resource! Reason: {}", .0)]
    KubeApiError(ClientError),
}
