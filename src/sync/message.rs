//! Sync message wire format.

use std::fmt;

/// A list mutation carried by a sync message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// Add the id to the white list (`addWhiteList`)
    AddWhiteList,
    /// Remove the id from the white list (`removeWhiteList`)
    RemoveWhiteList,
    /// Add the id to the black list (`addBlackList`)
    AddBlackList,
    /// Remove the id from the black list and reset its counter (`removeBlackList`)
    RemoveBlackList,
}

impl SyncAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::AddWhiteList => "addWhiteList",
            SyncAction::RemoveWhiteList => "removeWhiteList",
            SyncAction::AddBlackList => "addBlackList",
            SyncAction::RemoveBlackList => "removeBlackList",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "addWhiteList" => Some(SyncAction::AddWhiteList),
            "removeWhiteList" => Some(SyncAction::RemoveWhiteList),
            "addBlackList" => Some(SyncAction::AddBlackList),
            "removeBlackList" => Some(SyncAction::RemoveBlackList),
            _ => None,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// Mutation to apply
    pub action: SyncAction,
    /// Identity the mutation applies to
    pub id: String,
}

impl SyncMessage {
    /// Create a new message.
    pub fn new(action: SyncAction, id: &str) -> Self {
        Self {
            action,
            id: id.to_string(),
        }
    }

    /// Encode as `<action>-<id>`.
    pub fn to_wire(&self) -> String {
        format!("{}-{}", self.action, self.id)
    }

    /// Decode a `<action>-<id>` message.
    ///
    /// Only the first dash separates the action, so ids may contain dashes.
    /// Messages without a dash, with an empty id, or with an unknown action
    /// yield `None`.
    pub fn from_wire(message: &str) -> Option<Self> {
        let (action, id) = message.split_once('-')?;
        if id.is_empty() {
            return None;
        }
        let action = SyncAction::from_wire(action)?;
        Some(Self::new(action, id))
    }
}

impl fmt::Display for SyncMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.action, self.id)
    }
}
