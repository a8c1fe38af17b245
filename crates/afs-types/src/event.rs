use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{NodeGenericMetadata, NodeId};

/// Topic strings events are tagged with.
pub mod topics {
    /// Node tree changes (creation, rename, metadata, consistency, re-parenting).
    pub const NODE: &str = "NODE";
    /// Dependency edges, forward and backward.
    pub const DEPENDENCY: &str = "DEPENDENCY";
    /// Binary data (blob) updates and removals.
    pub const DATA: &str = "DATA";
    /// Time-series creation, data updates and clears.
    pub const TIME_SERIES: &str = "TIME_SERIES";
}

/// A typed notification pushed to the events bus after a successful mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeEvent {
    NodeCreated {
        id: NodeId,
        parent_id: Option<NodeId>,
    },
    NodeRemoved {
        id: NodeId,
        parent_id: Option<NodeId>,
    },
    NodeNameUpdated {
        id: NodeId,
        name: String,
    },
    NodeDescriptionUpdated {
        id: NodeId,
        description: String,
    },
    NodeMetadataUpdated {
        id: NodeId,
        metadata: NodeGenericMetadata,
    },
    NodeModificationTimeUpdated {
        id: NodeId,
        modification_time: i64,
    },
    NodeConsistent {
        id: NodeId,
    },
    ParentChanged {
        id: NodeId,
        old_parent_id: Option<NodeId>,
        new_parent_id: NodeId,
    },
    DependencyAdded {
        id: NodeId,
        name: String,
    },
    DependencyRemoved {
        id: NodeId,
        name: String,
    },
    BackwardDependencyAdded {
        id: NodeId,
        name: String,
    },
    BackwardDependencyRemoved {
        id: NodeId,
        name: String,
    },
    NodeDataUpdated {
        id: NodeId,
        data_name: String,
    },
    NodeDataRemoved {
        id: NodeId,
        data_name: String,
    },
    TimeSeriesCreated {
        id: NodeId,
        time_series_name: String,
    },
    TimeSeriesDataUpdated {
        id: NodeId,
        time_series_name: String,
    },
    TimeSeriesCleared {
        id: NodeId,
    },
}

impl NodeEvent {
    /// The node the event is about.
    pub fn id(&self) -> NodeId {
        match self {
            Self::NodeCreated { id, .. }
            | Self::NodeRemoved { id, .. }
            | Self::NodeNameUpdated { id, .. }
            | Self::NodeDescriptionUpdated { id, .. }
            | Self::NodeMetadataUpdated { id, .. }
            | Self::NodeModificationTimeUpdated { id, .. }
            | Self::NodeConsistent { id }
            | Self::ParentChanged { id, .. }
            | Self::DependencyAdded { id, .. }
            | Self::DependencyRemoved { id, .. }
            | Self::BackwardDependencyAdded { id, .. }
            | Self::BackwardDependencyRemoved { id, .. }
            | Self::NodeDataUpdated { id, .. }
            | Self::NodeDataRemoved { id, .. }
            | Self::TimeSeriesCreated { id, .. }
            | Self::TimeSeriesDataUpdated { id, .. }
            | Self::TimeSeriesCleared { id } => *id,
        }
    }

    /// The topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::NodeCreated { .. }
            | Self::NodeRemoved { .. }
            | Self::NodeNameUpdated { .. }
            | Self::NodeDescriptionUpdated { .. }
            | Self::NodeMetadataUpdated { .. }
            | Self::NodeModificationTimeUpdated { .. }
            | Self::NodeConsistent { .. }
            | Self::ParentChanged { .. } => topics::NODE,
            Self::DependencyAdded { .. }
            | Self::DependencyRemoved { .. }
            | Self::BackwardDependencyAdded { .. }
            | Self::BackwardDependencyRemoved { .. } => topics::DEPENDENCY,
            Self::NodeDataUpdated { .. } | Self::NodeDataRemoved { .. } => topics::DATA,
            Self::TimeSeriesCreated { .. }
            | Self::TimeSeriesDataUpdated { .. }
            | Self::TimeSeriesCleared { .. } => topics::TIME_SERIES,
        }
    }

    /// Short name of the event kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeCreated { .. } => "NodeCreated",
            Self::NodeRemoved { .. } => "NodeRemoved",
            Self::NodeNameUpdated { .. } => "NodeNameUpdated",
            Self::NodeDescriptionUpdated { .. } => "NodeDescriptionUpdated",
            Self::NodeMetadataUpdated { .. } => "NodeMetadataUpdated",
            Self::NodeModificationTimeUpdated { .. } => "NodeModificationTimeUpdated",
            Self::NodeConsistent { .. } => "NodeConsistent",
            Self::ParentChanged { .. } => "ParentChanged",
            Self::DependencyAdded { .. } => "DependencyAdded",
            Self::DependencyRemoved { .. } => "DependencyRemoved",
            Self::BackwardDependencyAdded { .. } => "BackwardDependencyAdded",
            Self::BackwardDependencyRemoved { .. } => "BackwardDependencyRemoved",
            Self::NodeDataUpdated { .. } => "NodeDataUpdated",
            Self::NodeDataRemoved { .. } => "NodeDataRemoved",
            Self::TimeSeriesCreated { .. } => "TimeSeriesCreated",
            Self::TimeSeriesDataUpdated { .. } => "TimeSeriesDataUpdated",
            Self::TimeSeriesCleared { .. } => "TimeSeriesCleared",
        }
    }
}

impl fmt::Display for NodeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.id())
    }
}

/// A batch of events flushed together under one topic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeEventList {
    pub topic: String,
    pub events: Vec<NodeEvent>,
}

impl NodeEventList {
    pub fn new(topic: impl Into<String>, events: Vec<NodeEvent>) -> Self {
        Self {
            topic: topic.into(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_by_kind() {
        let id = NodeId::new();
        assert_eq!(NodeEvent::NodeConsistent { id }.topic(), topics::NODE);
        assert_eq!(
            NodeEvent::BackwardDependencyAdded { id, name: "a".into() }.topic(),
            topics::DEPENDENCY
        );
        assert_eq!(
            NodeEvent::NodeDataRemoved { id, data_name: "d".into() }.topic(),
            topics::DATA
        );
        assert_eq!(NodeEvent::TimeSeriesCleared { id }.topic(), topics::TIME_SERIES);
    }

    #[test]
    fn id_accessor() {
        let id = NodeId::new();
        let event = NodeEvent::ParentChanged {
            id,
            old_parent_id: None,
            new_parent_id: NodeId::new(),
        };
        assert_eq!(event.id(), id);
    }

    #[test]
    fn display_includes_kind_and_id() {
        let id = NodeId::new();
        let text = NodeEvent::NodeCreated { id, parent_id: None }.to_string();
        assert!(text.starts_with("NodeCreated("));
        assert!(text.contains(&id.to_string()));
    }

    #[test]
    fn event_list_bincode_roundtrip() {
        let id = NodeId::new();
        let list = NodeEventList::new(
            topics::NODE,
            vec![
                NodeEvent::NodeCreated { id, parent_id: None },
                NodeEvent::NodeMetadataUpdated {
                    id,
                    metadata: NodeGenericMetadata::new().with_double("x", 0.5),
                },
            ],
        );
        let bytes = bincode::serialize(&list).unwrap();
        let decoded: NodeEventList = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(decoded.len(), 2);
    }
}
