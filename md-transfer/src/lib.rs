//! A poll-driven state machine for long-running deploy/retrieve operations against a
//! remote metadata service.
//!
//! `MetadataTransfer` is generic over [`MetadataTransferClient`] so the real wire SDK
//! (out of scope here) can be substituted without this crate depending on it; tests
//! exercise the state machine against an in-memory fake.

pub mod client;
pub mod result;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use md_component::ComponentSet;
use md_convert::{Converter, Direction};
use md_writer::ZipWriter;
use tokio::sync::mpsc::UnboundedSender;

pub use client::{DeployOptions, MetadataTransferClient, RetrieveOptions};
pub use result::{
    ComponentResult, DeployResult, DeployStatusResponse, FileResponse, RetrieveResult,
    RetrieveStatusResponse, StatusResponse, TransferStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transfer request failed: {0}")]
    RequestFailure(String),
    #[error(transparent)]
    Convert(#[from] md_convert::Error),
    #[error(transparent)]
    Write(#[from] md_writer::Error),
    #[error(transparent)]
    Component(#[from] md_component::component::Error),
}

/// What a [`MetadataTransfer`] is driving: a deploy of local source, or a retrieve
/// into a target set.
pub enum TransferKind {
    Deploy {
        set: ComponentSet,
        options: DeployOptions,
    },
    Retrieve {
        options: RetrieveOptions,
    },
}

/// Events a running transfer emits: the async-Rust equivalent of an
/// `update`/`finish`/`cancel` event emitter.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Update(StatusResponse),
    Finish(TransferOutcome),
}

#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Deploy(DeployResult),
    Retrieve(RetrieveResult),
    Canceled,
}

/// `Pending -> InProgress -> {Succeeded, Failed, Canceled}`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Pending,
    InProgress { id: String },
    Succeeded,
    Failed,
    Canceled,
}

/// Drives one deploy or retrieve operation to a terminal state.
pub struct MetadataTransfer<C: MetadataTransferClient> {
    client: Arc<C>,
    converter: Converter,
    kind: TransferKind,
    cancel: Arc<AtomicBool>,
    state: State,
}

impl<C: MetadataTransferClient> MetadataTransfer<C> {
    pub fn new(client: Arc<C>, converter: Converter, kind: TransferKind) -> Self {
        MetadataTransfer {
            client,
            converter,
            kind,
            cancel: Arc::new(AtomicBool::new(false)),
            state: State::Pending,
        }
    }

    /// A cooperative cancellation handle: setting it is observed at the next poll
    /// tick, never pre-empting in-flight work.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Runs `pre()` (uploading local source for a deploy, or issuing the retrieve
    /// request), then polls `poll_interval` apart until a terminal status is reached,
    /// emitting exactly one `Finish` event before returning.
    pub async fn start(
        mut self,
        poll_interval: Duration,
        events: UnboundedSender<TransferEvent>,
    ) -> Result<TransferOutcome, Error> {
        let id = self.pre().await?;
        self.state = State::InProgress { id: id.clone() };
        tracing::info!(id, "transfer started");

        loop {
            tokio::time::sleep(poll_interval).await;

            if self.cancel.load(Ordering::SeqCst) {
                self.do_cancel(&id).await?;
                self.state = State::Canceled;
                let _ = events.send(TransferEvent::Finish(TransferOutcome::Canceled));
                tracing::info!(id, "transfer canceled");
                return Ok(TransferOutcome::Canceled);
            }

            let status = self.check_status(&id).await?;
            if status.is_terminal() {
                let outcome = self.post(status).await?;
                self.state = match &outcome {
                    TransferOutcome::Deploy(r) if r.success => State::Succeeded,
                    TransferOutcome::Deploy(_) => State::Failed,
                    TransferOutcome::Retrieve(r) if r.success => State::Succeeded,
                    TransferOutcome::Retrieve(_) => State::Failed,
                    TransferOutcome::Canceled => State::Canceled,
                };
                let _ = events.send(TransferEvent::Finish(outcome.clone()));
                tracing::info!(id, "transfer finished");
                return Ok(outcome);
            }

            tracing::debug!(id, ?status, "transfer in progress");
            let _ = events.send(TransferEvent::Update(status));
        }
    }

    async fn pre(&mut self) -> Result<String, Error> {
        match &mut self.kind {
            TransferKind::Deploy { set, options } => {
                let mut writer = ZipWriter::new();
                self.converter
                    .convert(set, Direction::ToMetadata, None, &mut writer)
                    .await?;
                let zip = writer.finalize()?;
                self.client
                    .deploy(zip, options.clone())
                    .await
                    .map_err(|e| Error::RequestFailure(e.to_string()))
            }
            TransferKind::Retrieve { options } => self
                .client
                .retrieve(options.clone())
                .await
                .map_err(|e| Error::RequestFailure(e.to_string())),
        }
    }

    async fn check_status(&self, id: &str) -> Result<StatusResponse, Error> {
        match &self.kind {
            TransferKind::Deploy { .. } => self
                .client
                .check_deploy_status(id)
                .await
                .map(StatusResponse::Deploy)
                .map_err(|e| Error::RequestFailure(e.to_string())),
            TransferKind::Retrieve { .. } => self
                .client
                .check_retrieve_status(id)
                .await
                .map(StatusResponse::Retrieve)
                .map_err(|e| Error::RequestFailure(e.to_string())),
        }
    }

    async fn do_cancel(&self, id: &str) -> Result<(), Error> {
        let result = match &self.kind {
            TransferKind::Deploy { .. } => self.client.cancel_deploy(id).await,
            TransferKind::Retrieve { .. } => self.client.cancel_retrieve(id).await,
        };
        result.map_err(|e| Error::RequestFailure(e.to_string()))
    }

    async fn post(&mut self, status: StatusResponse) -> Result<TransferOutcome, Error> {
        match (&mut self.kind, status) {
            (TransferKind::Deploy { set, .. }, StatusResponse::Deploy(status)) => {
                let result = result::build_deploy_result(set, status).await?;
                Ok(TransferOutcome::Deploy(result))
            }
            (TransferKind::Retrieve { .. }, StatusResponse::Retrieve(status)) => {
                Ok(TransferOutcome::Retrieve(result::build_retrieve_result(status)))
            }
            _ => unreachable!("check_status always matches the transfer's own kind"),
        }
    }
}

/// A handle that can request cancellation of a running [`MetadataTransfer::start`]
/// future from another task.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Helper so call sites don't need to name the boxed future type for spawning a
/// transfer onto its own task.
pub fn spawn<C, F>(transfer: F) -> tokio::task::JoinHandle<Result<TransferOutcome, Error>>
where
    C: MetadataTransferClient + 'static,
    F: Future<Output = Result<TransferOutcome, Error>> + Send + 'static,
{
    tokio::task::spawn(transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use client::tests::FakeClient;
    use md_component::component::SourceComponent;
    use md_component::set::Member;
    use md_ignore::IgnoreMatcher;
    use md_tree::virtual_tree::{VirtualEntry, VirtualTree};
    use md_tree::Tree;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn apex_class_set() -> ComponentSet {
        let tree: Arc<dyn Tree> = Arc::new(VirtualTree::from_entries([(
            PathBuf::from("classes"),
            vec![
                VirtualEntry::file("A.cls", b"public class A {}".to_vec()),
                VirtualEntry::file("A.cls-meta.xml", b"<ApexClass/>".to_vec()),
            ],
        )]));
        let ty = md_registry::Registry::global().get("apexclass").unwrap();
        let component = Arc::new(SourceComponent {
            name: "A".to_string(),
            ty,
            parent: None,
            xml: Some(PathBuf::from("classes/A.cls-meta.xml")),
            content: Some(PathBuf::from("classes/A.cls")),
            tree,
            ignore: Arc::new(IgnoreMatcher::empty()),
        });
        let mut set = ComponentSet::new();
        set.add(Member::Source(component));
        set
    }

    #[tokio::test(start_paused = true)]
    async fn deploy_runs_to_success() {
        let client = Arc::new(FakeClient::succeeding_after(2));
        let transfer = MetadataTransfer::new(
            Arc::clone(&client),
            Converter::new(2),
            TransferKind::Deploy {
                set: apex_class_set(),
                options: DeployOptions::default(),
            },
        );

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = transfer.start(Duration::from_millis(1), tx).await.unwrap();

        match outcome {
            TransferOutcome::Deploy(result) => {
                assert!(result.success);
                assert!(!result.file_responses.is_empty());
            }
            _ => panic!("expected a deploy result"),
        }

        let mut updates = 0;
        let mut finishes = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                TransferEvent::Update(_) => updates += 1,
                TransferEvent::Finish(_) => finishes += 1,
            }
        }
        assert_eq!(updates, 2);
        assert_eq!(finishes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_short_circuits_the_poll_loop() {
        let client = Arc::new(FakeClient::succeeding_after(100));
        let transfer = MetadataTransfer::new(
            Arc::clone(&client),
            Converter::new(2),
            TransferKind::Deploy {
                set: apex_class_set(),
                options: DeployOptions::default(),
            },
        );
        let cancel = transfer.cancel_handle();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = tokio::spawn(transfer.start(Duration::from_millis(1), tx));

        tokio::time::sleep(Duration::from_millis(3)).await;
        cancel.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(outcome, TransferOutcome::Canceled));

        let mut saw_finish = false;
        while let Ok(event) = rx.try_recv() {
            if let TransferEvent::Finish(TransferOutcome::Canceled) = event {
                saw_finish = true;
            }
        }
        assert!(saw_finish);
    }
}
