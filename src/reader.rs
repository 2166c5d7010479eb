use crate::cli::DocumentKind;
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Trait for the archive-processing side of the pipeline. The dispatcher is
/// written against this seam only, so tests can substitute a double.
///
/// Opening is an inherent constructor on each implementation; release of the
/// underlying handle is `Drop`, so it happens on every exit path.
pub trait ArchiveReader {
    /// Materialize the archive's content tree under `dest`, creating it if absent.
    fn extract(&mut self, dest: &Path) -> Result<()>;
    /// Write a plain-text rendering of the archive's documents to `out`.
    fn convert_to_text(&mut self, out: &mut dyn Write) -> Result<()>;
    /// Assemble the archive's documents into a single HTML or PDF file at `dest`.
    fn convert_to_document(&mut self, dest: &Path, kind: DocumentKind) -> Result<()>;
    /// Stream the archive's raw embedded HTML to `out`.
    fn dump_markup(&mut self, out: &mut dyn Write) -> Result<()>;
}
