use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use md_component::set::Member;
use md_component::ComponentSet;
use md_convert::{Converter, Direction};
use md_registry::Registry;
use md_resolver::{resolve_source, ManifestResolver};
use md_tree::filesystem::FilesystemTree;
use md_tree::Tree;
use md_transfer::{
    DeployOptions, MetadataTransfer, MetadataTransferClient, RetrieveOptions, RetrieveStatusResponse,
    TransferKind,
};
use md_writer::{StandardWriter, ZipWriter};

/// Metadata source/package converter and transfer driver.
///
/// This binary is a thin integration point wiring the Resolver, ManifestResolver,
/// Converter, and MetadataTransfer onto a real filesystem tree; it is not the focus of
/// this workspace.
#[derive(Parser)]
#[command(name = "md-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Name of the ignore-file to look for ascending from a resolved path.
    #[arg(long, global = true, default_value = md_ignore::DEFAULT_IGNORE_FILE_NAME)]
    ignore_file: String,

    /// How many component pipelines may run concurrently.
    #[arg(long, global = true, default_value_t = 8)]
    concurrency: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a resolved component set between the source and metadata layouts.
    Convert {
        /// Package root to resolve from.
        #[arg(long)]
        input: PathBuf,
        /// Directory (or, with `--zip`, file) to write the result to.
        #[arg(long)]
        output: PathBuf,
        /// Which layout to convert into.
        #[arg(long, value_enum, default_value_t = Target::Metadata)]
        target: Target,
        /// Write a single zip archive instead of a directory tree.
        #[arg(long)]
        zip: bool,
        /// Restrict the resolve to the members named in this manifest XML, instead of
        /// everything found under `paths`.
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Paths under `input` to resolve; defaults to the whole tree.
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
    /// Resolve a source tree and print its package manifest.
    Manifest {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "60.0")]
        version: String,
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
    /// Run a deploy's local conversion and poll loop against a configured remote
    /// service. Without a real `MetadataTransferClient` wired in, this always fails
    /// with a request error -- it exists to show the integration seam, not to talk to
    /// a live org.
    Deploy {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = 2000)]
        poll_interval_ms: u64,
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Source,
    Metadata,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Convert {
            input,
            output,
            target,
            zip,
            manifest,
            paths,
        } => {
            convert(
                &input,
                &paths,
                &cli.ignore_file,
                cli.concurrency,
                target,
                &output,
                zip,
                manifest.as_deref(),
            )
            .await
        }
        Command::Manifest {
            input,
            version,
            paths,
        } => manifest(&input, &paths, &cli.ignore_file, &version).await,
        Command::Deploy {
            input,
            poll_interval_ms,
            paths,
        } => {
            deploy(
                &input,
                &paths,
                &cli.ignore_file,
                cli.concurrency,
                poll_interval_ms,
            )
            .await
        }
    }
}

/// Parses a manifest file into a filter `ComponentSet` of abstract `{type, fullName}`
/// members, so `resolve_source` only yields components named in it.
async fn manifest_filter(path: &std::path::Path) -> anyhow::Result<ComponentSet> {
    let xml = tokio::fs::read_to_string(path).await?;
    let resolution = ManifestResolver::parse(&xml, Registry::global())?;
    let mut set = ComponentSet::new();
    for component in resolution.components {
        set.add(Member::Abstract(component));
    }
    Ok(set)
}

#[allow(clippy::too_many_arguments)]
async fn convert(
    input: &PathBuf,
    paths: &[PathBuf],
    ignore_file: &str,
    concurrency: usize,
    target: Target,
    output: &PathBuf,
    zip: bool,
    manifest: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let tree: Arc<dyn Tree> = Arc::new(FilesystemTree::new(input));

    let mut filter = match manifest {
        Some(path) => Some(manifest_filter(path).await?),
        None => None,
    };
    let mut set = resolve_source(tree, paths, ignore_file, filter.as_mut()).await?;

    let direction = match target {
        Target::Metadata => Direction::ToMetadata,
        Target::Source => Direction::ToSource,
    };
    let converter = Converter::new(concurrency);

    if zip {
        let mut writer = ZipWriter::new();
        converter.convert(&mut set, direction, None, &mut writer).await?;
        let bytes = writer.finalize()?;
        tokio::fs::write(output, bytes).await?;
    } else {
        let mut writer = StandardWriter::new(output);
        converter.convert(&mut set, direction, None, &mut writer).await?;
    }

    tracing::info!(output = %output.display(), "conversion complete");
    Ok(())
}

async fn manifest(
    input: &PathBuf,
    paths: &[PathBuf],
    ignore_file: &str,
    version: &str,
) -> anyhow::Result<()> {
    let tree: Arc<dyn Tree> = Arc::new(FilesystemTree::new(input));
    let mut set = resolve_source(tree, paths, ignore_file, None).await?;
    let xml = set.get_package_xml(version)?;
    println!("{xml}");
    Ok(())
}

async fn deploy(
    input: &PathBuf,
    paths: &[PathBuf],
    ignore_file: &str,
    concurrency: usize,
    poll_interval_ms: u64,
) -> anyhow::Result<()> {
    let tree: Arc<dyn Tree> = Arc::new(FilesystemTree::new(input));
    let set = resolve_source(tree, paths, ignore_file, None).await?;

    let client = Arc::new(UnconfiguredClient);
    let transfer = MetadataTransfer::new(
        client,
        Converter::new(concurrency),
        TransferKind::Deploy {
            set,
            options: DeployOptions::default(),
        },
    );

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    match transfer
        .start(Duration::from_millis(poll_interval_ms), tx)
        .await
    {
        Ok(_) => Ok(()),
        Err(err) => Err(anyhow::anyhow!(
            "no remote connector is configured for this binary: {err}"
        )),
    }
}

/// A placeholder [`MetadataTransferClient`] that always refuses the request. The real
/// wire SDK this plugs into is out of scope; this exists only to make the wiring
/// compile and demonstrate where a real client slots in.
struct UnconfiguredClient;

#[derive(Debug, thiserror::Error)]
#[error("no remote metadata service is configured")]
struct UnconfiguredError;

impl MetadataTransferClient for UnconfiguredClient {
    type Error = UnconfiguredError;

    async fn deploy(&self, _zip: Vec<u8>, _options: DeployOptions) -> Result<String, Self::Error> {
        Err(UnconfiguredError)
    }

    async fn check_deploy_status(
        &self,
        _id: &str,
    ) -> Result<md_transfer::DeployStatusResponse, Self::Error> {
        Err(UnconfiguredError)
    }

    async fn cancel_deploy(&self, _id: &str) -> Result<(), Self::Error> {
        Err(UnconfiguredError)
    }

    async fn retrieve(&self, _options: RetrieveOptions) -> Result<String, Self::Error> {
        Err(UnconfiguredError)
    }

    async fn check_retrieve_status(&self, _id: &str) -> Result<RetrieveStatusResponse, Self::Error> {
        Err(UnconfiguredError)
    }

    async fn cancel_retrieve(&self, _id: &str) -> Result<(), Self::Error> {
        Err(UnconfiguredError)
    }
}
