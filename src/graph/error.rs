use super::types::{LinkId, NodeId};

/// Rejected graph mutations. None of these end an editing session; callers
/// log them and carry on.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum GraphError {
	#[error("unknown node `{0}`")]
	UnknownNode(NodeId),

	#[error("unknown link `{0}`")]
	UnknownLink(LinkId),

	#[error("link endpoint `{0}` does not resolve to a node")]
	UnresolvedEndpoint(NodeId),

	#[error("node `{0}` already exists")]
	DuplicateNode(NodeId),

	#[error("link `{0}` already exists")]
	DuplicateLink(LinkId),

	#[error("node `{id}` is locked by {holder}")]
	Locked { id: NodeId, holder: String },

	#[error("node `{0}` does not hold text")]
	NotTextNode(NodeId),

	#[error("invalid geometry for node `{0}`")]
	InvalidGeometry(NodeId),
}

/// Import files are rejected as a whole; there is no partial import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
	#[error("malformed document: {0}")]
	Json(#[from] serde_json::Error),

	#[error("document is not a JSON object")]
	NotAnObject,

	#[error("document is missing the `{0}` key")]
	MissingKey(&'static str),

	#[error("`{0}` must be an array")]
	NotAnArray(&'static str),
}
