// Request and response types shared by the facade methods

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result format for list and get operations.
///
/// Each operation accepts only a subset; the facade rejects the rest locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListFormat {
    /// Plain list of UUIDs
    IdsOnly,
    Basic,
    /// Full records, may require extra privileges
    Full,
}

impl ListFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListFormat::IdsOnly => "ids_only",
            ListFormat::Basic => "basic",
            ListFormat::Full => "full",
        }
    }
}

impl fmt::Display for ListFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply of the `whoami` endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct WhoAmI {
    pub id: String,
}

/// One entry of a job's connection forwarding map.
///
/// The server encodes entries as `[public_ip, public_port, destination_port]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRule {
    pub public_ip: String,
    pub public_port: u16,
    pub destination_port: u16,
}

/// Options for stopping a job
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobStopOptions {
    /// Save the PaaS cluster
    pub save: bool,
    /// Textual description for the saved cluster
    pub saved_description: Option<String>,
    /// Save the cluster's home FS
    pub save_homefs: bool,
    /// Force stop a stalled job
    pub force: bool,
}
