use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Capability tags a role can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,  // See events of one's groups
    Write, // Create, update, delete events within one's groups
    Admin, // Everything, across all groups
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Admin => "admin",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Capability::Read),
            "write" => Ok(Capability::Write),
            "admin" => Ok(Capability::Admin),
            _ => Err(()),
        }
    }
}

/// Separators accepted between tags of a role's permission descriptor
const DESCRIPTOR_SEPARATORS: &[char] = &[',', ';', '|', ' ', '\t'];

/// Parsed form of a role's permission descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    capabilities: HashSet<Capability>,
}

impl PermissionSet {
    /// Splits the descriptor once on its separators. Unknown tags are
    /// dropped, so "readonly" never grants `read`.
    pub fn parse(descriptor: &str) -> Self {
        let capabilities = descriptor
            .split(DESCRIPTOR_SEPARATORS)
            .filter(|tag| !tag.is_empty())
            .filter_map(|tag| {
                let parsed = tag.parse::<Capability>().ok();
                if parsed.is_none() {
                    log::debug!("Ignoring unknown capability tag '{}'", tag);
                }
                parsed
            })
            .collect();
        Self { capabilities }
    }

    /// `admin` implies `write`
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Admin => self.capabilities.contains(&Capability::Admin),
            Capability::Write => {
                self.capabilities.contains(&Capability::Write)
                    || self.capabilities.contains(&Capability::Admin)
            }
            Capability::Read => self.capabilities.contains(&Capability::Read),
        }
    }

    /// Probe with a raw tag, as received from a client
    pub fn has_tag(&self, tag: &str) -> bool {
        tag.parse::<Capability>()
            .map(|capability| self.has(capability))
            .unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.has(Capability::Admin)
    }

    pub fn can_write(&self) -> bool {
        self.has(Capability::Write)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

/// Authenticated identity attached to a request once the guard passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: u64,
}

impl Subject {
    pub fn new(id: u64) -> Self {
        Self { id }
    }
}
