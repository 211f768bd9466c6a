//! Consumes [`WriterFormat`](md_transform::WriterFormat) write instructions and
//! stages output to either a filesystem directory ([`StandardWriter`]) or an
//! in-memory ZIP buffer ([`ZipWriter`]).
//!
//! Both variants buffer a component's writes and apply them atomically: either all
//! of a component's files land, or none do.

pub mod standard;
pub mod zip_writer;

use md_transform::WriterFormat;

pub use standard::StandardWriter;
pub use zip_writer::ZipWriter;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read source for {output}: {source}")]
    Read {
        output: std::path::PathBuf,
        #[source]
        source: md_transform::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to stage a zip entry {path}: {source}")]
    Zip {
        path: std::path::PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// A writer that consumes a component's write instructions, buffering them so that
/// the whole component's writes commit or roll back as a unit.
#[async_trait::async_trait]
pub trait Writer: Send {
    async fn write_component(&mut self, format: WriterFormat) -> Result<(), Error>;
}

async fn read_all_staged(
    format: &WriterFormat,
) -> Result<Vec<(std::path::PathBuf, Vec<u8>)>, Error> {
    let mut staged = Vec::with_capacity(format.write_infos.len());
    for instr in &format.write_infos {
        let bytes = instr
            .source
            .read_all()
            .await
            .map_err(|source| Error::Read {
                output: instr.output.clone(),
                source,
            })?;
        staged.push((instr.output.clone(), bytes));
    }
    Ok(staged)
}
