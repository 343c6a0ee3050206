//! The JSON manifest embedded in compiled artifacts.

use serde::{Deserialize, Serialize};

/// Magic bytes opening every artifact.
pub const FORMAT_MAGIC: &[u8; 4] = b"WGRM";

/// Current artifact format version.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A well-known port a public parser handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

/// One public parser exposed by the module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParserEntry {
    pub name: String,
    #[serde(default)]
    pub mime_types: Vec<String>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Entry unit name inside the module.
    pub entry: String,
}

/// Identity and build metadata for a compiled artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub magic: String,
    pub version: u32,
    pub created_timestamp: u64,
    pub debug_flag: bool,
    pub optimize_flag: bool,
    #[serde(default)]
    pub parsers: Vec<ParserEntry>,
}

impl Manifest {
    pub fn new(created_timestamp: u64, debug_flag: bool, optimize_flag: bool) -> Self {
        Self {
            magic: String::from_utf8_lossy(FORMAT_MAGIC).into_owned(),
            version: FORMAT_VERSION,
            created_timestamp,
            debug_flag,
            optimize_flag,
            parsers: Vec::new(),
        }
    }

    pub fn with_parser(mut self, parser: ParserEntry) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Find the parser registered for a MIME type.
    pub fn parser_for_mime(&self, mime: &str) -> Option<&ParserEntry> {
        self.parsers
            .iter()
            .find(|p| p.mime_types.iter().any(|m| m == mime))
    }
}
