//! Per-frame statistics of a scene

/// What happened during the last `Scene::update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number (starting at 0)
    pub frame: u64,

    /// Live entities after the kill phase
    pub entity_count: usize,

    /// Live components after the kill phase
    pub component_count: usize,

    /// Components initialized and registered by the init phase
    pub initialized: usize,

    /// Live components removed by the kill phase
    pub removed: usize,

    /// Handler calls made by all relays of the frame
    pub deliveries: usize,

    /// Bounders that collided
    pub collided: usize,

    /// Bounders moved by collision resolution
    pub adjusted: usize,

    /// Ray picks issued by the collision step
    pub picks: usize,

    /// Wall time of the whole update (microseconds)
    pub update_time_us: u64,
}

impl FrameStats {
    /// Whether the frame changed the set of live components
    pub const fn lifecycle_changed(&self) -> bool {
        self.initialized > 0 || self.removed > 0
    }
}
