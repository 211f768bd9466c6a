//! Remote status payload shapes and the deploy/retrieve result-synthesis algorithm.

use std::collections::HashMap;
use std::path::PathBuf;

use md_component::component::SourceComponent;
use md_component::ComponentSet;
use md_ore::xml::OneOrMany;
use serde::Deserialize;

use crate::Error;

/// `Pending -> InProgress -> {Succeeded, Failed, Canceled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

/// Either a deploy or retrieve status response, normalized from the wire by the
/// caller's [`MetadataTransferClient`](crate::MetadataTransferClient) implementation.
#[derive(Debug, Clone)]
pub enum StatusResponse {
    Deploy(DeployStatusResponse),
    Retrieve(RetrieveStatusResponse),
}

impl StatusResponse {
    pub fn status(&self) -> TransferStatus {
        match self {
            StatusResponse::Deploy(r) => r.status,
            StatusResponse::Retrieve(r) => r.status,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status(),
            TransferStatus::Succeeded | TransferStatus::Failed | TransferStatus::Canceled
        )
    }
}

/// A single component's deploy result, as reported for one relevant filesystem path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub full_name: String,
    pub component_type: String,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub changed: bool,
    #[serde(default)]
    pub deleted: bool,
    pub success: bool,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub line_number: Option<i64>,
    #[serde(default)]
    pub column_number: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct DeployStatusResponse {
    pub status: TransferStatus,
    pub success: bool,
    pub component_successes: Vec<ComponentResult>,
    pub component_failures: Vec<ComponentResult>,
}

impl DeployStatusResponse {
    /// Parses a raw status document, normalizing the singleton-vs-array
    /// `componentSuccesses`/`componentFailures` quirk via [`OneOrMany`].
    pub fn from_wire_xml(xml: &str) -> Result<Self, quick_xml::DeError> {
        let raw: RawDeployStatusResponse = quick_xml::de::from_str(xml)?;
        Ok(raw.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeployStatusResponse {
    status: TransferStatus,
    success: bool,
    #[serde(default)]
    component_successes: OneOrMany<ComponentResult>,
    #[serde(default)]
    component_failures: OneOrMany<ComponentResult>,
}

impl From<RawDeployStatusResponse> for DeployStatusResponse {
    fn from(raw: RawDeployStatusResponse) -> Self {
        DeployStatusResponse {
            status: raw.status,
            success: raw.success,
            component_successes: raw.component_successes.into_vec(),
            component_failures: raw.component_failures.into_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveStatusResponse {
    pub status: TransferStatus,
    pub success: bool,
    pub zip_bytes: Option<Vec<u8>>,
}

/// One filesystem path's worth of a deploy result: a success or a diagnostic against
/// a specific component file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResponse {
    pub full_name: String,
    pub component_type: String,
    pub success: bool,
    pub problem: Option<String>,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DeployResult {
    pub status: TransferStatus,
    pub success: bool,
    pub file_responses: Vec<FileResponse>,
}

#[derive(Debug, Clone)]
pub struct RetrieveResult {
    pub status: TransferStatus,
    pub success: bool,
    pub zip_bytes: Option<Vec<u8>>,
}

/// Strips known-wrong identifiers the remote service is known to emit, e.g. the
/// Aura/LWC `markup://c:` namespace prefix, before a `fullName` is used as a grouping
/// key.
fn sanitize_full_name(full_name: &str) -> String {
    full_name
        .strip_prefix("markup://c:")
        .unwrap_or(full_name)
        .to_string()
}

fn message_key(full_name: &str, component_type: &str) -> String {
    format!("{}#{}", sanitize_full_name(full_name), component_type)
}

/// Builds a `DeployResult` by walking every source-backed component (and its
/// children) in `set`, matching each against the status's per-component messages, and
/// emitting one `FileResponse` per relevant filesystem path.
pub(crate) async fn build_deploy_result(
    set: &mut ComponentSet,
    status: DeployStatusResponse,
) -> Result<DeployResult, Error> {
    let mut messages: HashMap<String, Vec<&ComponentResult>> = HashMap::new();
    for result in status.component_successes.iter().chain(status.component_failures.iter()) {
        messages
            .entry(message_key(&result.full_name, &result.component_type))
            .or_default()
            .push(result);
    }

    let mut file_responses = Vec::new();
    for component in set.get_source_components() {
        collect_file_responses(&component, &messages, &mut file_responses);
        for child in component.children().await? {
            collect_file_responses(&child, &messages, &mut file_responses);
        }
    }

    Ok(DeployResult {
        status: status.status,
        success: status.success,
        file_responses,
    })
}

pub(crate) fn build_retrieve_result(status: RetrieveStatusResponse) -> RetrieveResult {
    RetrieveResult {
        status: status.status,
        success: status.success,
        zip_bytes: status.zip_bytes,
    }
}

/// Emits this component's `FileResponse`s: on failure, one response carrying the
/// diagnostic (a known upstream anomaly collapses a component that both failed and
/// succeeded to its failure only); on success, one response per content file plus one
/// for the xml.
fn collect_file_responses(
    component: &SourceComponent,
    messages: &HashMap<String, Vec<&ComponentResult>>,
    out: &mut Vec<FileResponse>,
) {
    let key = message_key(&component.full_name(), &component.ty.name);
    let Some(results) = messages.get(&key) else {
        return;
    };

    if let Some(failure) = results.iter().find(|r| !r.success) {
        let file_path = if component.content.is_none() {
            component.xml.clone().unwrap_or_default()
        } else {
            component
                .content
                .clone()
                .or_else(|| component.xml.clone())
                .unwrap_or_default()
        };
        out.push(FileResponse {
            full_name: component.full_name(),
            component_type: component.ty.name.clone(),
            success: false,
            problem: failure.problem.clone(),
            file_path,
        });
        return;
    }

    if results.iter().any(|r| r.success) {
        if let Some(content) = &component.content {
            out.push(FileResponse {
                full_name: component.full_name(),
                component_type: component.ty.name.clone(),
                success: true,
                problem: None,
                file_path: content.clone(),
            });
        }
        if let Some(xml) = &component.xml {
            out.push(FileResponse {
                full_name: component.full_name(),
                component_type: component.ty.name.clone(),
                success: true,
                problem: None,
                file_path: xml.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_component::set::Member;
    use md_ignore::IgnoreMatcher;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};
    use md_tree::Tree;
    use std::sync::Arc as StdArc;

    fn apex_class_component() -> StdArc<SourceComponent> {
        let tree: StdArc<dyn Tree> = StdArc::new(VirtualTree::from_entries([(
            PathBuf::from("classes"),
            vec![
                VirtualEntry::file("A.cls", b"public class A {}".to_vec()),
                VirtualEntry::file("A.cls-meta.xml", b"<ApexClass/>".to_vec()),
            ],
        )]));
        let ty = md_registry::Registry::global().get("apexclass").unwrap();
        StdArc::new(SourceComponent {
            name: "A".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("classes/A.cls-meta.xml")),
            content: Some(PathBuf::from("classes/A.cls")),
            tree,
            ignore: StdArc::new(IgnoreMatcher::empty()),
        })
    }

    fn success(full_name: &str, component_type: &str) -> ComponentResult {
        ComponentResult {
            full_name: full_name.to_string(),
            component_type: component_type.to_string(),
            created: false,
            changed: true,
            deleted: false,
            success: true,
            problem: None,
            problem_type: None,
            line_number: None,
            column_number: None,
        }
    }

    fn failure(full_name: &str, component_type: &str, problem: &str) -> ComponentResult {
        ComponentResult {
            full_name: full_name.to_string(),
            component_type: component_type.to_string(),
            created: false,
            changed: false,
            deleted: false,
            success: false,
            problem: Some(problem.to_string()),
            problem_type: Some("Error".to_string()),
            line_number: Some(3),
            column_number: Some(1),
        }
    }

    #[tokio::test]
    async fn success_yields_content_and_xml_responses() {
        let mut set = ComponentSet::new();
        set.add(Member::Source(apex_class_component()));

        let status = DeployStatusResponse {
            status: TransferStatus::Succeeded,
            success: true,
            component_successes: vec![success("A", "ApexClass")],
            component_failures: Vec::new(),
        };
        let result = build_deploy_result(&mut set, status).await.unwrap();
        assert_eq!(result.file_responses.len(), 2);
        assert!(result.file_responses.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn bundle_anomaly_collapses_to_failure_only() {
        let mut set = ComponentSet::new();
        set.add(Member::Source(apex_class_component()));

        let status = DeployStatusResponse {
            status: TransferStatus::Failed,
            success: false,
            component_successes: vec![success("A", "ApexClass")],
            component_failures: vec![failure("A", "ApexClass", "compile error")],
        };
        let result = build_deploy_result(&mut set, status).await.unwrap();
        assert_eq!(result.file_responses.len(), 1);
        assert!(!result.file_responses[0].success);
        assert_eq!(
            result.file_responses[0].problem.as_deref(),
            Some("compile error")
        );
    }

    #[tokio::test]
    async fn markup_namespace_prefix_is_stripped_before_matching() {
        let mut set = ComponentSet::new();
        set.add(Member::Source(apex_class_component()));

        let status = DeployStatusResponse {
            status: TransferStatus::Succeeded,
            success: true,
            component_successes: vec![success("markup://c:A", "ApexClass")],
            component_failures: Vec::new(),
        };
        let result = build_deploy_result(&mut set, status).await.unwrap();
        assert_eq!(result.file_responses.len(), 2);
    }
}
