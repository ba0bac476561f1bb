use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    api::{DeleteParams, Patch, PatchParams, PostParams},
    Api, Client,
};
use log::debug;
use serde_json::Value;

use crate::{helpers::pretty_type_name, resources::network_attachment::NetworkAttachmentDefinition};

use super::{ClientError, ResourceClient};

/// [`ResourceClient`] backed by the cluster API.
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
    field_manager: String,
}

impl KubeResourceClient {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        let mut params = PostParams::default();
        params.field_manager = Some(self.field_manager.to_owned());

        params
    }

    fn patch_params(&self) -> PatchParams {
        let mut params = PatchParams::default();
        params.field_manager = Some(self.field_manager.to_owned());

        params
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_network_attachment_definition(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, ClientError> {
        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);

        debug!(
            "Fetching '{name}' {} from '{namespace}'...",
            pretty_type_name::<NetworkAttachmentDefinition>()
        );

        Ok(api.get(name).await?)
    }

    async fn create_network_attachment_definition(
        &self,
        namespace: &str,
        definition: &NetworkAttachmentDefinition,
    ) -> Result<(), ClientError> {
        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);

        api.create(&self.post_params(), definition).await?;

        Ok(())
    }

    async fn delete_network_attachment_definition(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClientError> {
        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);

        api.delete(name, &DeleteParams::default()).await?;

        Ok(())
    }

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<StatefulSet, ClientError> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);

        debug!(
            "Fetching '{name}' {} from '{namespace}'...",
            pretty_type_name::<StatefulSet>()
        );

        Ok(api.get(name).await?)
    }

    async fn merge_patch_statefulset(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), ClientError> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);

        api.patch(name, &self.patch_params(), &Patch::Merge(patch)).await?;

        Ok(())
    }
}
