use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    #[serde(alias = "titular")]
    Holder,
    #[serde(alias = "convenio")]
    Agreement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Membership number, e.g. `S-0042`.
    pub number: String,
    /// National identity document number.
    #[serde(default)]
    pub document_id: String,
    pub name: String,
    pub contact: String,
    pub membership_type: MembershipType,
    pub is_active: bool,
}

/// Membership lookup. Inactive members are reported as absent.
pub trait MemberDirectory: Send + Sync {
    fn verify_member(&self, identifier: &str) -> Option<MemberRecord>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    members: Vec<MemberRecord>,
}

/// Directory backed by a static member list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    members: Vec<MemberRecord>,
}

impl StaticDirectory {
    pub fn new(members: Vec<MemberRecord>) -> Self {
        Self { members }
    }

    /// Parse `{"members": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: DirectoryFile = serde_json::from_str(json)?;
        Ok(Self::new(file.members))
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(std::io::Error::other)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl MemberDirectory for StaticDirectory {
    /// Matches the membership number case-insensitively, or the document id exactly.
    fn verify_member(&self, identifier: &str) -> Option<MemberRecord> {
        let wanted = identifier.trim();
        if wanted.is_empty() {
            return None;
        }
        self.members
            .iter()
            .find(|m| m.number.eq_ignore_ascii_case(wanted) || m.document_id == wanted)
            .filter(|m| m.is_active)
            .cloned()
    }
}
