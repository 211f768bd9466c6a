//! The remote service contract [`MetadataTransfer`](crate::MetadataTransfer) is
//! generic over.
//!
//! Deliberately a plain trait with native `async fn`s rather than an `#[async_trait]`
//! object -- `MetadataTransfer<C>` is monomorphized per client, so no `dyn` object
//! safety is needed. A real wire SDK (out of scope here) implements this trait; tests
//! use [`tests::FakeClient`].

use crate::result::{DeployStatusResponse, RetrieveStatusResponse};

/// Options accepted by a deploy request. Mirrors the opaque, caller-supplied bag the
/// spec treats as external-interface detail.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub check_only: bool,
    pub rollback_on_error: bool,
    pub test_level: Option<String>,
}

/// Options accepted by a retrieve request.
#[derive(Debug, Clone, Default)]
pub struct RetrieveOptions {
    pub package_names: Vec<String>,
    pub single_package: bool,
}

/// The async contract a remote metadata service must satisfy.
pub trait MetadataTransferClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn deploy(
        &self,
        zip: Vec<u8>,
        options: DeployOptions,
    ) -> impl std::future::Future<Output = Result<String, Self::Error>> + Send;

    fn check_deploy_status(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<DeployStatusResponse, Self::Error>> + Send;

    fn cancel_deploy(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;

    fn retrieve(
        &self,
        options: RetrieveOptions,
    ) -> impl std::future::Future<Output = Result<String, Self::Error>> + Send;

    fn check_retrieve_status(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<RetrieveStatusResponse, Self::Error>> + Send;

    fn cancel_retrieve(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send;
}
