//! The flow filter language: a Wireshark-style boolean expression grammar
//! over flow fields, with CIDR membership, substring IP matching, and
//! implicit-AND juxtaposition.
//!
//! Examples:
//! - `src=192.168 && proto=tcp`
//! - `port=80 || port=443`
//! - `!proto=udp` or `not proto=udp`
//! - `src=10.0.0.0/8 dport=53` (space = implicit AND)
//! - `!(src=10.0.0.1 && port=53)`

mod ast;
pub mod history;
mod parse;
pub mod suggest;
mod token;

pub use ast::{ConditionNode, ExprNode, Field};
pub use parse::parse_filter;

use flowscope_types::Flow;
use std::fmt::Display;

/// A parsed filter. Construction never fails; a filter that did not parse
/// carries its error text, matches everything, and keeps no expression
/// tree.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    root: Option<ExprNode>,
    raw: String,
    error: Option<String>,
}

impl Filter {
    /// True when no filter expression is set.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// True when the filter text parsed without errors.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The collected parse errors, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Evaluates the filter against a flow. An empty or invalid filter
    /// matches everything.
    pub fn matches(&self, flow: &Flow) -> bool {
        match &self.root {
            Some(root) => root.evaluate(flow),
            None => true,
        }
    }

    pub(crate) fn new(root: Option<ExprNode>, raw: String, error: Option<String>) -> Self {
        Self { root, raw, error }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}
