//! Extract and convert CHM (compiled HTML help) archives.
//!
//! The front end resolves argv into a single [`cli::Task`] and the dispatcher
//! runs exactly one operation against an [`reader::ArchiveReader`]; the
//! default backend in [`chm`] reads the ITSF container format directly.

pub mod chm;
pub mod cli;
pub mod dispatch;
pub mod error;
pub mod reader;
pub mod text;

pub use chm::ChmFile;
pub use cli::{Action, Cli, DocumentKind, OutputFormat, Task};
pub use error::ChmError;
pub use reader::ArchiveReader;
