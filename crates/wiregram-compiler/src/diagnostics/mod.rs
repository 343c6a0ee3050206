//! Construction diagnostics: everything reported before parsing starts.

mod collection;
mod message;
mod printer;

pub use collection::Diagnostics;
pub use message::{DiagnosticMessage, Severity};
pub use printer::DiagnosticsPrinter;
