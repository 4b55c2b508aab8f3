//! Entity-Component-System layer
//!
//! Entities are generational ids; components are boxed trait objects owned by
//! the [`Registry`] and routed to exactly one subsystem by [`SystemId`].
//! Creation and destruction are queued and committed by the scene at fixed
//! points of the frame.

pub mod component;
pub mod components;
pub mod entity;
pub mod registry;
pub mod systems;
pub mod world;

pub use component::{AsAny, Component, ComponentContext, ComponentHandle, ComponentKey, SystemId};
pub use entity::{EntityId, Stage};
pub use registry::{KillReport, Registry, RegistryError, RemovedComponent};
pub use world::World;
