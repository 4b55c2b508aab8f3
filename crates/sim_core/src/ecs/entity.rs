//! Entity identifiers

use slotmap::new_key_type;

new_key_type! {
    /// Generational entity identifier.
    ///
    /// Handed out immediately by `create_entity`; a stale id (the entity was
    /// destroyed and its slot reused) never resolves to the new occupant.
    pub struct EntityId;
}

/// Where an entity or component is in its two-phase lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Created this frame, waiting for the next init phase
    Pending,
    /// Committed and visible to queries and systems
    Live,
}
