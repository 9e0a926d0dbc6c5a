//! Directory handling policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing a directory policy
#[derive(Debug, Clone)]
pub struct ParseDirectoryPolicyError(String);

impl fmt::Display for ParseDirectoryPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid directory policy: {}", self.0)
    }
}

impl std::error::Error for ParseDirectoryPolicyError {}

/// How a request for a "directory" path (key ending in `/`) is answered
///
/// One policy applies to the whole process; the two are never combined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryPolicy {
    /// Render an HTML index from a prefix listing
    #[default]
    Synthesize,
    /// Serve the `index.html` object stored under the prefix
    IndexFile,
}

impl DirectoryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryPolicy::Synthesize => "synthesize",
            DirectoryPolicy::IndexFile => "index-file",
        }
    }
}

impl FromStr for DirectoryPolicy {
    type Err = ParseDirectoryPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synthesize" => Ok(DirectoryPolicy::Synthesize),
            "index-file" | "index_file" => Ok(DirectoryPolicy::IndexFile),
            _ => Err(ParseDirectoryPolicyError(s.to_string())),
        }
    }
}
