use std::fmt;

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Where a moved task lands relative to its new siblings.
///
/// Anchors name neighbours rather than integers so an update still means the
/// same thing after the authority renumbers the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    AfterTaskId(TaskId),
    BeforeTaskId(TaskId),
    First,
    Last,
}

impl Anchor {
    /// The sibling this anchor references, if any
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Anchor::AfterTaskId(id) | Anchor::BeforeTaskId(id) => Some(id),
            Anchor::First | Anchor::Last => None,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::AfterTaskId(id) => write!(f, "after {}", id),
            Anchor::BeforeTaskId(id) => write!(f, "before {}", id),
            Anchor::First => write!(f, "first"),
            Anchor::Last => write!(f, "last"),
        }
    }
}

/// One unit of reorder intent exchanged with the ordering authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativePositionUpdate {
    pub id: TaskId,
    pub parent_id: Option<TaskId>,
    pub anchor: Anchor,
}

impl RelativePositionUpdate {
    pub fn new(id: impl Into<TaskId>, parent_id: Option<&str>, anchor: Anchor) -> Self {
        RelativePositionUpdate {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            anchor,
        }
    }
}

impl fmt::Display for RelativePositionUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent_id {
            Some(pid) => write!(f, "{} → {} under {}", self.id, self.anchor, pid),
            None => write!(f, "{} → {} at root", self.id, self.anchor),
        }
    }
}

/// Whether the drop reorders among siblings or nests into the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropMode {
    Reorder,
    Nest,
}

/// Which edge of the target row the pointer was over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Above,
    Below,
}

/// Drop zone as reported by the drag-gesture recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropZoneDescriptor {
    pub mode: DropMode,
    pub target_task_id: TaskId,
    #[serde(default)]
    pub edge: Option<Edge>,
}

/// Everything the drag collaborator hands over on drag end.
///
/// `zone` is `None` when the pointer was released outside any valid zone.
/// `drop_index` is the insertion point in the flattened render sequence
/// (rows before it stay above the dropped block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEvent {
    pub zone: Option<DropZoneDescriptor>,
    pub dragged_ids: Vec<TaskId>,
    #[serde(default)]
    pub drop_index: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_wire_shape() {
        let update = RelativePositionUpdate::new("A", None, Anchor::AfterTaskId("C".into()));
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(
            json,
            r#"{"id":"A","parent_id":null,"anchor":{"after_task_id":"C"}}"#
        );

        let last: RelativePositionUpdate =
            serde_json::from_str(r#"{"id":"B","parent_id":"A","anchor":"last"}"#).unwrap();
        assert_eq!(last.anchor, Anchor::Last);
        assert_eq!(last.parent_id.as_deref(), Some("A"));
    }

    #[test]
    fn drop_zone_edge_defaults_to_none() {
        let zone: DropZoneDescriptor =
            serde_json::from_str(r#"{"mode":"nest","target_task_id":"A"}"#).unwrap();
        assert_eq!(zone.mode, DropMode::Nest);
        assert_eq!(zone.edge, None);
    }

    #[test]
    fn display_reads_like_intent() {
        let update =
            RelativePositionUpdate::new("B", Some("A"), Anchor::BeforeTaskId("C".into()));
        assert_eq!(update.to_string(), "B → before C under A");
        assert_eq!(
            RelativePositionUpdate::new("B", None, Anchor::First).to_string(),
            "B → first at root"
        );
    }
}
