use super::state::StateRecord;

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id, or [`END`](super::END).
    pub to: String,
    /// Condition on the source node's output that must hold to traverse this edge.
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge, evaluated against the record the
/// source node just returned. Only `is_valid` is consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse only if the output record is valid.
    WhenValid,
    /// Traverse only if the output record is not valid.
    WhenInvalid,
}

impl EdgeCondition {
    pub fn matches(self, output: &StateRecord) -> bool {
        match self {
            Self::Always => true,
            Self::WhenValid => output.is_valid(),
            Self::WhenInvalid => !output.is_valid(),
        }
    }
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::Always)
    }

    /// Create an edge taken when the source produced a valid record.
    pub fn when_valid(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::WhenValid)
    }

    /// Create an edge taken when the source produced an invalid record.
    pub fn when_invalid(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::WhenInvalid)
    }

    fn new(from: impl Into<String>, to: impl Into<String>, condition: EdgeCondition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition,
        }
    }
}
