use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an individually tracked entity. Stale ids never alias a
    /// live entity, so removal notifications for already-removed entities
    /// are detected rather than misapplied.
    pub struct EntityId;
}

/// Position of an entity in the spawn grid, in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
}

impl GridCell {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}
