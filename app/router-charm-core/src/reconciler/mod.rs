use k8s_openapi::api::apps::v1::StatefulSet;
use log::{error, info};

use crate::{
    helpers::{pretty_type_name, LogTarget},
    kubernetes::{ClientError, ResourceClient},
    resources::{
        network_attachment::{CniConfig, NetworkAttachmentDefinition},
        statefulset::{NetworkSelection, PodTemplateView},
    },
};

use self::error::ReconcilerError;

pub mod error;

/// Keeps the cluster side of a charm in shape: the NetworkAttachmentDefinition
/// and the charm's own StatefulSet pod template.
///
/// Every `ensure_*` call reads the current state first and only mutates when
/// something is missing, so calling them on each event delivery is safe. The
/// StatefulSet is fetched again right before a patch is built.
pub struct ClusterReconciler<C> {
    client: C,
    namespace: String,
    statefulset_name: String,
    log: LogTarget,
}

impl<C: ResourceClient> ClusterReconciler<C> {
    pub fn new(
        client: C,
        namespace: impl Into<String>,
        statefulset_name: impl Into<String>,
        log: LogTarget,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            statefulset_name: statefulset_name.into(),
            log,
        }
    }

    pub async fn network_attachment_definition_exists(
        &self,
        name: &str,
    ) -> Result<bool, ReconcilerError> {
        let target = self.log.as_str();
        let kind = pretty_type_name::<NetworkAttachmentDefinition>();

        match self
            .client
            .get_network_attachment_definition(&self.namespace, name)
            .await
        {
            Ok(_) => {
                info!(target: target, "{kind} '{name}' already created");
                Ok(true)
            }
            Err(ClientError::NotFound) => {
                info!(target: target, "{kind} '{name}' not yet created");
                Ok(false)
            }
            Err(ClientError::ResourceTypeMissing(details)) => {
                error!(target: target, "{kind} resource not found ({details}). You may need to install Multus CNI.");
                Err(ReconcilerError::MultusNotInstalled)
            }
            Err(err) => Err(ReconcilerError::KubeApiError(err)),
        }
    }

    pub async fn ensure_network_attachment_definition(
        &self,
        name: &str,
        config: &CniConfig,
    ) -> Result<(), ReconcilerError> {
        if self.network_attachment_definition_exists(name).await? {
            return Ok(());
        }

        let definition = config
            .to_definition(name)
            .map_err(ReconcilerError::Serialization)?;

        self.client
            .create_network_attachment_definition(&self.namespace, &definition)
            .await
            .map_err(ReconcilerError::KubeApiError)?;

        info!(
            target: self.log.as_str(),
            "{} '{name}' created",
            pretty_type_name::<NetworkAttachmentDefinition>()
        );

        Ok(())
    }

    pub async fn delete_network_attachment_definition(
        &self,
        name: &str,
    ) -> Result<(), ReconcilerError> {
        if !self.network_attachment_definition_exists(name).await? {
            return Ok(());
        }

        match self
            .client
            .delete_network_attachment_definition(&self.namespace, name)
            .await
        {
            Ok(_) | Err(ClientError::NotFound) => {
                info!(
                    target: self.log.as_str(),
                    "{} '{name}' deleted",
                    pretty_type_name::<NetworkAttachmentDefinition>()
                );
                Ok(())
            }
            Err(err) => Err(ReconcilerError::KubeApiError(err)),
        }
    }

    pub async fn security_context_is_patched(
        &self,
        container_index: usize,
        capabilities: &[String],
    ) -> Result<bool, ReconcilerError> {
        self.get_pod_template()
            .await?
            .is_privileged_with(container_index, capabilities)
            .map_err(ReconcilerError::ResourceView)
    }

    pub async fn ensure_security_context(
        &self,
        container_index: usize,
        capabilities: &[String],
    ) -> Result<(), ReconcilerError> {
        if self
            .security_context_is_patched(container_index, capabilities)
            .await?
        {
            return Ok(());
        }

        let mut template = self.get_pod_template().await?;
        template
            .grant_privileged(container_index, capabilities)
            .map_err(ReconcilerError::ResourceView)?;

        self.patch_statefulset(&template.containers_patch()).await?;

        info!(target: self.log.as_str(), "Security context patched in statefulset '{}'", self.statefulset_name);

        Ok(())
    }

    pub async fn multus_annotation_is_added(
        &self,
        selection: &NetworkSelection,
    ) -> Result<bool, ReconcilerError> {
        let added = self
            .get_pod_template()
            .await?
            .has_network_selection(selection)
            .map_err(ReconcilerError::ResourceView)?;

        if !added {
            info!(target: self.log.as_str(), "Multus annotation for '{}' not yet added to statefulset", selection.interface);
        }

        Ok(added)
    }

    pub async fn ensure_multus_annotation(
        &self,
        selection: &NetworkSelection,
    ) -> Result<(), ReconcilerError> {
        if self.multus_annotation_is_added(selection).await? {
            return Ok(());
        }

        let mut template = self.get_pod_template().await?;
        let changed = template
            .append_network_selection(selection)
            .map_err(ReconcilerError::ResourceView)?;

        // someone else added it between the check and the re-fetch
        if !changed {
            return Ok(());
        }

        self.patch_statefulset(&template.network_selections_patch())
            .await?;

        info!(
            target: self.log.as_str(),
            "Multus annotation added to statefulset '{}': {} via {} ({})",
            self.statefulset_name,
            selection.name,
            selection.interface,
            selection.ips.join(", ")
        );

        Ok(())
    }

    async fn get_pod_template(&self) -> Result<PodTemplateView, ReconcilerError> {
        let statefulset = self
            .client
            .get_statefulset(&self.namespace, &self.statefulset_name)
            .await
            .map_err(|err| match err {
                ClientError::NotFound => ReconcilerError::MissingObject(
                    format!(
                        "{} {}",
                        pretty_type_name::<StatefulSet>(),
                        self.statefulset_name
                    )
                    .into(),
                ),
                err => ReconcilerError::KubeApiError(err),
            })?;

        PodTemplateView::from_statefulset(&statefulset).map_err(ReconcilerError::ResourceView)
    }

    async fn patch_statefulset(&self, patch: &serde_json::Value) -> Result<(), ReconcilerError> {
        self.client
            .merge_patch_statefulset(&self.namespace, &self.statefulset_name, patch)
            .await
            .map_err(ReconcilerError::KubeApiError)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use k8s_openapi::api::apps::v1::StatefulSet;
    use serde_json::Value;

    use crate::{
        helpers::LogTarget,
        kubernetes::{ClientError, MockResourceClient},
        resources::{
            network_attachment::{CniConfig, NETWORK_ATTACHMENT_DEFINITION_NAME},
            statefulset::{
                tests::{
                    charm_and_workload_containers, privileged_context, selection,
                    statefulset_with,
                },
                NetworkSelection, MULTUS_NETWORKS_ANNOTATION,
            },
        },
    };

    use super::{error::ReconcilerError, ClusterReconciler};

    fn reconciler(client: MockResourceClient) -> ClusterReconciler<MockResourceClient> {
        ClusterReconciler::new(client, "whatever", "router", LogTarget::CLUSTER)
    }

    fn net_admin() -> Vec<String> {
        vec!["NET_ADMIN".to_owned()]
    }

    /// Serves the given StatefulSet, applying merge patches on top of it the
    /// same way the API server would for the fields the charm touches.
    pub fn serve_statefulset(
        client: &mut MockResourceClient,
        statefulset: StatefulSet,
    ) -> Arc<Mutex<Vec<Value>>> {
        let state = Arc::new(Mutex::new(serde_json::to_value(statefulset).unwrap()));
        let patches = Arc::new(Mutex::new(Vec::new()));

        let read_state = state.clone();
        client.expect_get_statefulset().returning(move |_, _| {
            Ok(serde_json::from_value(read_state.lock().unwrap().clone()).unwrap())
        });

        let recorded = patches.clone();
        client
            .expect_merge_patch_statefulset()
            .returning(move |_, _, patch| {
                merge(&mut state.lock().unwrap(), patch);
                recorded.lock().unwrap().push(patch.clone());
                Ok(())
            });

        patches
    }

    fn merge(target: &mut Value, patch: &Value) {
        match (target, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    merge(target.entry(key.to_owned()).or_insert(Value::Null), value);
                }
            }
            (target, patch) => *target = patch.clone(),
        }
    }

    #[tokio::test]
    async fn ensure_network_attachment_definition_creates_once() {
        let mut client = MockResourceClient::new();
        let created = Arc::new(AtomicUsize::new(0));

        let lookups = created.clone();
        client
            .expect_get_network_attachment_definition()
            .returning(move |_, name| match lookups.load(Ordering::SeqCst) {
                0 => Err(ClientError::NotFound),
                _ => Ok(CniConfig::macvlan_static().to_definition(name).unwrap()),
            });
        let creations = created.clone();
        client
            .expect_create_network_attachment_definition()
            .times(1)
            .withf(|namespace, definition| {
                namespace == "whatever"
                    && definition.metadata.name.as_deref()
                        == Some(NETWORK_ATTACHMENT_DEFINITION_NAME)
            })
            .returning(move |_, _| {
                creations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let reconciler = reconciler(client);
        let config = CniConfig::macvlan_static();

        reconciler
            .ensure_network_attachment_definition(NETWORK_ATTACHMENT_DEFINITION_NAME, &config)
            .await
            .unwrap();
        reconciler
            .ensure_network_attachment_definition(NETWORK_ATTACHMENT_DEFINITION_NAME, &config)
            .await
            .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_definition_kind_is_a_configuration_error() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_network_attachment_definition()
            .returning(|_, _| Err(ClientError::ResourceTypeMissing("404 page not found".into())));
        client.expect_create_network_attachment_definition().never();

        let result = reconciler(client)
            .ensure_network_attachment_definition(
                NETWORK_ATTACHMENT_DEFINITION_NAME,
                &CniConfig::macvlan_static(),
            )
            .await;

        assert!(matches!(result, Err(ReconcilerError::MultusNotInstalled)));
    }

    #[tokio::test]
    async fn delete_is_issued_only_while_the_definition_exists() {
        let mut client = MockResourceClient::new();
        let deleted = Arc::new(AtomicUsize::new(0));

        let lookups = deleted.clone();
        client
            .expect_get_network_attachment_definition()
            .returning(move |_, name| match lookups.load(Ordering::SeqCst) {
                0 => Ok(CniConfig::macvlan_static().to_definition(name).unwrap()),
                _ => Err(ClientError::NotFound),
            });
        let deletions = deleted.clone();
        client
            .expect_delete_network_attachment_definition()
            .times(1)
            .returning(move |_, _| {
                deletions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let reconciler = reconciler(client);

        reconciler
            .delete_network_attachment_definition(NETWORK_ATTACHMENT_DEFINITION_NAME)
            .await
            .unwrap();
        reconciler
            .delete_network_attachment_definition(NETWORK_ATTACHMENT_DEFINITION_NAME)
            .await
            .unwrap();

        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lost_delete_race_is_not_an_error() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_network_attachment_definition()
            .returning(|_, name| Ok(CniConfig::macvlan_static().to_definition(name).unwrap()));
        client
            .expect_delete_network_attachment_definition()
            .returning(|_, _| Err(ClientError::NotFound));

        reconciler(client)
            .delete_network_attachment_definition(NETWORK_ATTACHMENT_DEFINITION_NAME)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn patched_security_context_is_left_alone() {
        let mut client = MockResourceClient::new();
        let statefulset = statefulset_with(
            charm_and_workload_containers(Some(privileged_context(&["NET_ADMIN"]))),
            None,
        );
        client
            .expect_get_statefulset()
            .returning(move |_, _| Ok(statefulset.clone()));
        client.expect_merge_patch_statefulset().never();

        reconciler(client)
            .ensure_security_context(1, &net_admin())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unpatched_security_context_is_patched_once() {
        let mut client = MockResourceClient::new();
        let patches = serve_statefulset(
            &mut client,
            statefulset_with(charm_and_workload_containers(None), None),
        );
        let reconciler = reconciler(client);

        reconciler
            .ensure_security_context(1, &net_admin())
            .await
            .unwrap();
        reconciler
            .ensure_security_context(1, &net_admin())
            .await
            .unwrap();

        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);

        let context = &patches[0]["spec"]["template"]["spec"]["containers"][1]["securityContext"];
        assert_eq!(context["privileged"], true);
        assert_eq!(context["capabilities"]["add"], serde_json::json!(["NET_ADMIN"]));
    }

    #[tokio::test]
    async fn statefulset_without_spec_fails_security_context() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_statefulset()
            .returning(|_, _| Ok(StatefulSet::default()));
        client.expect_merge_patch_statefulset().never();

        let result = reconciler(client)
            .ensure_security_context(1, &net_admin())
            .await;

        assert!(matches!(result, Err(ReconcilerError::ResourceView(_))));
    }

    #[tokio::test]
    async fn out_of_range_container_fails_security_context() {
        let mut client = MockResourceClient::new();
        client.expect_get_statefulset().returning(|_, _| {
            Ok(statefulset_with(charm_and_workload_containers(None), None))
        });
        client.expect_merge_patch_statefulset().never();

        let result = reconciler(client)
            .ensure_security_context(5, &net_admin())
            .await;

        assert!(matches!(result, Err(ReconcilerError::ResourceView(_))));
    }

    #[tokio::test]
    async fn missing_statefulset_is_reported_by_name() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_statefulset()
            .returning(|_, _| Err(ClientError::NotFound));

        let result = reconciler(client)
            .ensure_security_context(1, &net_admin())
            .await;

        assert!(matches!(result, Err(ReconcilerError::MissingObject(_))));
    }

    #[tokio::test]
    async fn same_multus_selection_is_never_duplicated() {
        let mut client = MockResourceClient::new();
        let patches = serve_statefulset(
            &mut client,
            statefulset_with(charm_and_workload_containers(None), None),
        );
        let reconciler = reconciler(client);
        let eth1 = selection("eth1", "1.2.3.4/24");

        reconciler.ensure_multus_annotation(&eth1).await.unwrap();
        reconciler.ensure_multus_annotation(&eth1).await.unwrap();

        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);

        let annotation = patches[0]["spec"]["template"]["metadata"]["annotations"]
            [MULTUS_NETWORKS_ANNOTATION]
            .as_str()
            .unwrap();
        let selections: Vec<Value> = serde_json::from_str(annotation).unwrap();
        assert_eq!(
            selections,
            vec![serde_json::json!({
                "name": "router-net",
                "interface": "eth1",
                "ips": ["1.2.3.4/24"]
            })]
        );
    }

    #[tokio::test]
    async fn distinct_selections_keep_insertion_order() {
        let mut client = MockResourceClient::new();
        let existing = BTreeMap::from([(
            MULTUS_NETWORKS_ANNOTATION.to_owned(),
            serde_json::to_string(&vec![selection("eth1", "1.2.3.4/24")]).unwrap(),
        )]);
        let patches = serve_statefulset(
            &mut client,
            statefulset_with(charm_and_workload_containers(None), Some(existing)),
        );
        let reconciler = reconciler(client);

        reconciler
            .ensure_multus_annotation(&selection("eth1", "1.2.3.4/24"))
            .await
            .unwrap();
        reconciler
            .ensure_multus_annotation(&selection("eth1", "9.9.9.9/24"))
            .await
            .unwrap();

        let patches = patches.lock().unwrap();
        assert_eq!(patches.len(), 1);

        let annotation = patches[0]["spec"]["template"]["metadata"]["annotations"]
            [MULTUS_NETWORKS_ANNOTATION]
            .as_str()
            .unwrap();
        let ips: Vec<_> = serde_json::from_str::<Vec<NetworkSelection>>(annotation)
            .unwrap()
            .into_iter()
            .map(|selection| selection.ips[0].to_owned())
            .collect();
        assert_eq!(ips, vec!["1.2.3.4/24", "9.9.9.9/24"]);
    }

    #[tokio::test]
    async fn foreign_selections_are_written_back_untouched() {
        let mut client = MockResourceClient::new();
        let existing = BTreeMap::from([(
            MULTUS_NETWORKS_ANNOTATION.to_owned(),
            r#"[{"name":"other-net","namespace":"kube-system","interface":"net2"}]"#.to_owned(),
        )]);
        let patches = serve_statefulset(
            &mut client,
            statefulset_with(charm_and_workload_containers(None), Some(existing)),
        );

        reconciler(client)
            .ensure_multus_annotation(&selection("eth1", "1.2.3.4/24"))
            .await
            .unwrap();

        let patches = patches.lock().unwrap();
        let annotation = patches[0]["spec"]["template"]["metadata"]["annotations"]
            [MULTUS_NETWORKS_ANNOTATION]
            .as_str()
            .unwrap();
        let selections: Vec<Value> = serde_json::from_str(annotation).unwrap();
        assert_eq!(
            selections,
            vec![
                serde_json::json!({
                    "name": "other-net",
                    "namespace": "kube-system",
                    "interface": "net2"
                }),
                serde_json::json!({
                    "name": "router-net",
                    "interface": "eth1",
                    "ips": ["1.2.3.4/24"]
                }),
            ]
        );
    }

    #[tokio::test]
    async fn api_failures_propagate() {
        let mut client = MockResourceClient::new();
        client.expect_get_statefulset().returning(|_, _| {
            Err(ClientError::ResourceTypeMissing("apps/v1 unavailable".into()))
        });
        client.expect_merge_patch_statefulset().never();

        let result = reconciler(client)
            .ensure_multus_annotation(&selection("eth1", "1.2.3.4/24"))
            .await;

        assert!(matches!(result, Err(ReconcilerError::KubeApiError(_))));
    }
}
