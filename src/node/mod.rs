// Node - Orchestrateur du nœud Arbor
pub mod service;

pub use service::{Engine, Node, NodeError};
