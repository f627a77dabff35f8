//! Multi-document YAML handling and typed object extraction.
//!
//! Documents are resolved against the built-in Kubernetes API types from
//! `k8s-openapi`: a document is only accepted when its `apiVersion`/`kind`
//! pair names a known type and it deserializes as that type.

use k8s_openapi::api;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{Metadata, Resource};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_yaml::Value;

/// An object found in a rendered manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Split a multi-document YAML stream on `---` separator lines.
///
/// Documents containing only whitespace or comments are dropped.
pub fn split_documents(stream: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in stream.lines() {
        if is_separator(line) {
            push_document(&mut documents, std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut documents, current);
    documents
}

fn is_separator(line: &str) -> bool {
    let line = line.trim_end();
    line == "---" || line.starts_with("--- ")
}

fn push_document(documents: &mut Vec<String>, document: String) {
    let has_content = document.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#')
    });
    if has_content {
        documents.push(document);
    }
}

type Decoder = fn(Value) -> Result<ObjectMeta, serde_yaml::Error>;

struct KnownKind {
    api_version: &'static str,
    kind: &'static str,
    decode: Decoder,
}

fn decode<K>(value: Value) -> Result<ObjectMeta, serde_yaml::Error>
where
    K: Resource + Metadata<Ty = ObjectMeta> + DeserializeOwned,
{
    let object: K = serde_yaml::from_value(value)?;
    Ok(object.metadata().clone())
}

fn known<K>() -> KnownKind
where
    K: Resource + Metadata<Ty = ObjectMeta> + DeserializeOwned,
{
    KnownKind {
        api_version: K::API_VERSION,
        kind: K::KIND,
        decode: decode::<K>,
    }
}

macro_rules! registry {
    ($($ty:ty),* $(,)?) => {
        vec![$(known::<$ty>()),*]
    };
}

/// Every built-in resource type with object metadata.
fn known_kinds() -> Vec<KnownKind> {
    registry![
        api::admissionregistration::v1::MutatingWebhookConfiguration,
        api::admissionregistration::v1::ValidatingAdmissionPolicy,
        api::admissionregistration::v1::ValidatingAdmissionPolicyBinding,
        api::admissionregistration::v1::ValidatingWebhookConfiguration,
        apiextensions::v1::CustomResourceDefinition,
        apiregistration::v1::APIService,
        api::apps::v1::ControllerRevision,
        api::apps::v1::DaemonSet,
        api::apps::v1::Deployment,
        api::apps::v1::ReplicaSet,
        api::apps::v1::StatefulSet,
        api::autoscaling::v1::HorizontalPodAutoscaler,
        api::autoscaling::v2::HorizontalPodAutoscaler,
        api::batch::v1::CronJob,
        api::batch::v1::Job,
        api::certificates::v1::CertificateSigningRequest,
        api::coordination::v1::Lease,
        api::core::v1::ComponentStatus,
        api::core::v1::ConfigMap,
        api::core::v1::Endpoints,
        api::core::v1::Event,
        api::core::v1::LimitRange,
        api::core::v1::Namespace,
        api::core::v1::Node,
        api::core::v1::PersistentVolume,
        api::core::v1::PersistentVolumeClaim,
        api::core::v1::Pod,
        api::core::v1::PodTemplate,
        api::core::v1::ReplicationController,
        api::core::v1::ResourceQuota,
        api::core::v1::Secret,
        api::core::v1::Service,
        api::core::v1::ServiceAccount,
        api::discovery::v1::EndpointSlice,
        api::events::v1::Event,
        api::flowcontrol::v1::FlowSchema,
        api::flowcontrol::v1::PriorityLevelConfiguration,
        api::networking::v1::Ingress,
        api::networking::v1::IngressClass,
        api::networking::v1::NetworkPolicy,
        api::node::v1::RuntimeClass,
        api::policy::v1::PodDisruptionBudget,
        api::rbac::v1::ClusterRole,
        api::rbac::v1::ClusterRoleBinding,
        api::rbac::v1::Role,
        api::rbac::v1::RoleBinding,
        api::scheduling::v1::PriorityClass,
        api::storage::v1::CSIDriver,
        api::storage::v1::CSINode,
        api::storage::v1::CSIStorageCapacity,
        api::storage::v1::StorageClass,
        api::storage::v1::VolumeAttachment,
    ]
}

/// Extract the names of every object of kind `want_kind`, in document order.
///
/// Unparsable documents, and documents that do not resolve to a known API
/// type, are logged and skipped. Duplicate names are kept.
pub fn extract_by_kind(documents: &[String], want_kind: &str) -> Vec<NamedObject> {
    let registry = known_kinds();
    let mut objects = Vec::new();

    for (index, document) in documents.iter().enumerate() {
        let value: Value = match serde_yaml::from_str(document) {
            Ok(Value::Null) => continue,
            Ok(value) => value,
            Err(e) => {
                warn!("skipping document {}: invalid YAML: {}", index, e);
                continue;
            }
        };

        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if kind != want_kind {
            continue;
        }
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let Some(known) = registry
            .iter()
            .find(|k| k.kind == kind && k.api_version == api_version)
        else {
            warn!(
                "skipping document {}: unknown type {:?} {:?}",
                index, api_version, kind
            );
            continue;
        };

        let metadata = match (known.decode)(value) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("skipping document {}: not a valid {}: {}", index, kind, e);
                continue;
            }
        };

        match metadata.name {
            Some(name) => objects.push(NamedObject {
                api_version,
                kind: known.kind.to_string(),
                name,
                namespace: metadata.namespace,
            }),
            None => debug!("skipping unnamed {} in document {}", kind, index),
        }
    }

    objects
}
