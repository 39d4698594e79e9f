//! Direct provenance links between nodes.
//!
//! A [`Link`] says that `output` was produced using (or after) `input`. The
//! `label` distinguishes several links with the same endpoints (different
//! input roles) and plays no part in closure tracking. Only links with
//! `include_in_closure` set are propagated into the Closure Store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{LinkId, NodeId};

/// The kind of provenance relationship a link records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// A calculation created a data node.
    Create,
    /// A data node was an input to a calculation.
    Input,
    /// A workflow called a sub-process.
    Call,
    /// A workflow returned an existing data node.
    ///
    /// Return links point "backwards" in time and would close cycles in the
    /// closure, so they opt out of closure tracking by default.
    Return,
}

impl LinkType {
    /// Whether links of this type participate in the closure unless told otherwise.
    pub fn default_include_in_closure(self) -> bool {
        !matches!(self, LinkType::Return)
    }

    /// Stable lowercase name, used for storage and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Create => "create",
            LinkType::Input => "input",
            LinkType::Call => "call",
            LinkType::Return => "return",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(LinkType::Create),
            "input" => Ok(LinkType::Input),
            "call" => Ok(LinkType::Call),
            "return" => Ok(LinkType::Return),
            _ => Err(CoreError::UnknownLinkType {
                name: s.to_string(),
            }),
        }
    }
}

/// A direct link as submitted to the Edge Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub input: NodeId,
    pub output: NodeId,
    pub label: String,
    pub link_type: LinkType,
    /// Whether this link is propagated into the Closure Store.
    pub include_in_closure: bool,
}

impl Link {
    /// Builds a link whose closure flag follows [`LinkType::default_include_in_closure`].
    pub fn new(
        input: NodeId,
        output: NodeId,
        label: impl Into<String>,
        link_type: LinkType,
    ) -> Self {
        Link {
            input,
            output,
            label: label.into(),
            link_type,
            include_in_closure: link_type.default_include_in_closure(),
        }
    }

    /// Overrides the closure flag.
    pub fn with_closure(mut self, include_in_closure: bool) -> Self {
        self.include_in_closure = include_in_closure;
        self
    }

    /// Returns `true` if both endpoints are the same node.
    pub fn is_self_loop(&self) -> bool {
        self.input == self.output
    }

    /// Checks the link-local invariants the Edge Store enforces before any
    /// closure work: labels are non-empty, and a closure-eligible link may
    /// not point at its own input.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.label.trim().is_empty() {
            return Err(CoreError::InvalidLabel {
                reason: "label must not be empty".to_string(),
            });
        }
        if self.include_in_closure && self.is_self_loop() {
            return Err(CoreError::SelfLoop { node: self.input });
        }
        Ok(())
    }
}

/// A link as persisted, with its allocated identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLink {
    pub id: LinkId,
    #[serde(flatten)]
    pub link: Link,
}
