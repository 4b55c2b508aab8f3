//! Spatial step bookkeeping: frame snapshots, gravity and change announcements

use crate::core::config::SpatialConfig;
use crate::ecs::components::SpatialComponent;
use crate::ecs::registry::Registry;
use crate::events::messages::SpatialTransformed;
use crate::events::Mailbox;
use crate::foundation::math::{safe_norm, Vec3};

/// State shared by everything in the spatial step
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialSystem {
    gravity: Vec3,
}

impl SpatialSystem {
    /// Create from configuration
    pub fn new(config: &SpatialConfig) -> Self {
        Self {
            gravity: config.gravity,
        }
    }

    /// Gravitational acceleration
    pub const fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Unit direction of gravity (zero when gravity is off)
    pub fn gravity_dir(&self) -> Vec3 {
        safe_norm(&self.gravity)
    }

    /// Change gravity
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    /// Record every live spatial's transform as the frame's starting point
    pub fn begin_frame(&self, registry: &mut Registry) {
        let handles: Vec<_> = registry.components_of_type::<SpatialComponent>().collect();
        for handle in handles {
            if let Some(spatial) = registry.get_mut(handle) {
                spatial.begin_frame();
            }
        }
    }

    /// Send one `SpatialTransformed` per spatial changed loudly since the last
    /// call, addressed to its entity. Returns how many were sent.
    pub fn announce_changes(&self, registry: &mut Registry, mailbox: &mut Mailbox) -> usize {
        let handles: Vec<_> = registry.components_of_type::<SpatialComponent>().collect();
        let mut sent = 0;
        for handle in handles {
            let Some(entity) = registry.owner(handle.key()) else { continue };
            let Some(spatial) = registry.get_mut(handle) else { continue };
            let changes = spatial.take_changes();
            if changes.is_empty() {
                continue;
            }
            mailbox.send(
                Some(entity),
                SpatialTransformed {
                    entity,
                    spatial: handle,
                    changes,
                },
            );
            sent += 1;
        }
        sent
    }
}

impl Default for SpatialSystem {
    fn default() -> Self {
        Self::new(&SpatialConfig::default())
    }
}
