//! Entity/component registry with two-phase (queued) creation and destruction
//!
//! Entities and components live in generational arenas. Creation and
//! destruction only queue work; the scene commits it at the init phase (start
//! of a frame) and the kill phase (end of a frame). Global lookups only ever
//! see committed components. Per-entity lookups see linked components, which
//! includes a batch being initialized so `init` can find its siblings.

use std::any::TypeId;
use std::collections::HashMap;

use slotmap::SlotMap;

use crate::ecs::component::{AsAny, Component, ComponentHandle, ComponentKey, SystemId};
use crate::ecs::components::SpatialComponent;
use crate::ecs::entity::{EntityId, Stage};

/// Registry errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The entity was never created or has already been removed
    #[error("Unknown entity: {0:?}")]
    UnknownEntity(EntityId),

    /// The component was never added or has already been removed
    #[error("Unknown component: {0:?}")]
    UnknownComponent(ComponentKey),
}

#[derive(Debug)]
struct EntityRecord {
    stage: Stage,
    doomed: bool,
    /// Every component owned by the entity, linked or still queued
    components: Vec<ComponentKey>,
    spatial: Option<ComponentKey>,
}

struct ComponentSlot {
    owner: EntityId,
    system: SystemId,
    type_id: TypeId,
    type_name: &'static str,
    stage: Stage,
    doomed: bool,
    linked: bool,
    /// `None` while the component is checked out for `init`/`update`
    component: Option<Box<dyn Component>>,
}

/// A live component removed by the kill phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovedComponent {
    /// Key the component had
    pub key: ComponentKey,
    /// Entity that owned it
    pub owner: EntityId,
    /// Store it was registered with
    pub system: SystemId,
    /// Concrete type
    pub type_id: TypeId,
}

/// What one kill phase removed, restricted to things that had become live
#[derive(Default)]
pub struct KillReport {
    /// Live entities removed
    pub entities: Vec<EntityId>,
    /// Live components removed, including those of removed entities
    pub components: Vec<RemovedComponent>,
    /// The removed live components themselves, for their `kill` hook
    pub retired: Vec<(RemovedComponent, Box<dyn Component>)>,
    /// Entities and components dropped before they ever became live
    pub discarded: usize,
}

impl std::fmt::Debug for KillReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KillReport")
            .field("entities", &self.entities)
            .field("components", &self.components)
            .field("retired", &self.retired.len())
            .field("discarded", &self.discarded)
            .finish()
    }
}

/// Owner of every entity and component of a scene
pub struct Registry {
    entities: SlotMap<EntityId, EntityRecord>,
    components: SlotMap<ComponentKey, ComponentSlot>,
    stores: [Vec<ComponentKey>; SystemId::COUNT],
    by_type: HashMap<TypeId, Vec<ComponentKey>>,
    init_entities: Vec<EntityId>,
    init_components: Vec<ComponentKey>,
    kill_entities: Vec<EntityId>,
    kill_components: Vec<ComponentKey>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            components: SlotMap::with_key(),
            stores: Default::default(),
            by_type: HashMap::new(),
            init_entities: Vec::new(),
            init_components: Vec::new(),
            kill_entities: Vec::new(),
            kill_components: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle requests
    // ---------------------------------------------------------------------

    /// Queue a new entity. The id is usable right away (e.g. to add
    /// components) but the entity only becomes live at the next init phase.
    pub fn create_entity(&mut self) -> EntityId {
        let entity = self.entities.insert(EntityRecord {
            stage: Stage::Pending,
            doomed: false,
            components: Vec::new(),
            spatial: None,
        });
        self.init_entities.push(entity);
        entity
    }

    /// Take ownership of `component` and queue it for init on `entity`
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<ComponentHandle<T>, RegistryError> {
        let record = self.entities.get_mut(entity).ok_or(RegistryError::UnknownEntity(entity))?;
        let system = component.system_id();
        let key = self.components.insert(ComponentSlot {
            owner: entity,
            system,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            stage: Stage::Pending,
            doomed: false,
            linked: false,
            component: Some(Box::new(component)),
        });
        record.components.push(key);
        self.init_components.push(key);
        Ok(ComponentHandle::new(key))
    }

    /// Queue an entity and all of its components for the kill phase.
    ///
    /// Returns false if the entity is unknown or already queued.
    pub fn destroy_entity(&mut self, entity: EntityId) -> bool {
        match self.entities.get_mut(entity) {
            Some(record) if !record.doomed => {
                record.doomed = true;
                self.kill_entities.push(entity);
                true
            }
            _ => false,
        }
    }

    /// Queue a single component for the kill phase
    pub fn remove_component(&mut self, key: ComponentKey) -> bool {
        match self.components.get_mut(key) {
            Some(slot) if !slot.doomed => {
                slot.doomed = true;
                self.kill_components.push(key);
                true
            }
            _ => false,
        }
    }

    /// Whether anything waits for the init phase
    pub fn has_pending_init(&self) -> bool {
        !self.init_entities.is_empty() || !self.init_components.is_empty()
    }

    /// Whether anything waits for the kill phase
    pub fn has_pending_kill(&self) -> bool {
        !self.kill_entities.is_empty() || !self.kill_components.is_empty()
    }

    // ---------------------------------------------------------------------
    // Init / kill phase steps, driven by the scene
    // ---------------------------------------------------------------------

    /// Make queued entities live, skipping those already doomed.
    /// Returns how many were promoted.
    pub(crate) fn promote_pending_entities(&mut self) -> usize {
        let queued = std::mem::take(&mut self.init_entities);
        let mut promoted = 0;
        for entity in queued {
            if let Some(record) = self.entities.get_mut(entity) {
                if record.stage == Stage::Pending && !record.doomed {
                    record.stage = Stage::Live;
                    promoted += 1;
                }
            }
        }
        promoted
    }

    /// Take the queued components that can be committed now. Components of
    /// doomed or vanished entities are left for the kill phase to discard.
    pub(crate) fn take_init_batch(&mut self) -> Vec<ComponentKey> {
        let queued = std::mem::take(&mut self.init_components);
        queued
            .into_iter()
            .filter(|&key| {
                let Some(slot) = self.components.get(key) else { return false };
                let owner_ready = self
                    .entities
                    .get(slot.owner)
                    .is_some_and(|record| record.stage == Stage::Live && !record.doomed);
                slot.stage == Stage::Pending && !slot.doomed && owner_ready
            })
            .collect()
    }

    /// Attach a queued component to its entity
    pub(crate) fn link(&mut self, key: ComponentKey) {
        let Some(slot) = self.components.get_mut(key) else { return };
        slot.linked = true;
        if slot.type_id == TypeId::of::<SpatialComponent>() {
            if let Some(record) = self.entities.get_mut(slot.owner) {
                record.spatial.get_or_insert(key);
            }
        }
    }

    /// Commit a linked component to its system store and type index
    pub(crate) fn register(&mut self, key: ComponentKey) -> Option<(EntityId, SystemId, TypeId)> {
        let slot = self.components.get_mut(key)?;
        if slot.stage == Stage::Live {
            return None;
        }
        slot.stage = Stage::Live;
        self.stores[slot.system.index()].push(key);
        self.by_type.entry(slot.type_id).or_default().push(key);
        Some((slot.owner, slot.system, slot.type_id))
    }

    /// Apply every queued destruction
    pub(crate) fn apply_kills(&mut self) -> KillReport {
        let mut report = KillReport::default();

        for entity in std::mem::take(&mut self.kill_entities) {
            let Some(record) = self.entities.remove(entity) else { continue };
            for key in record.components {
                if let Some(slot) = self.components.get_mut(key) {
                    if !slot.doomed {
                        slot.doomed = true;
                        self.kill_components.push(key);
                    }
                }
            }
            match record.stage {
                Stage::Live => report.entities.push(entity),
                Stage::Pending => report.discarded += 1,
            }
        }

        for key in std::mem::take(&mut self.kill_components) {
            let Some(slot) = self.components.remove(key) else { continue };
            if let Some(record) = self.entities.get_mut(slot.owner) {
                record.components.retain(|&k| k != key);
                if record.spatial == Some(key) {
                    record.spatial = None;
                }
            }
            match slot.stage {
                Stage::Live => {
                    remove_ordered(&mut self.stores[slot.system.index()], key);
                    if let Some(keys) = self.by_type.get_mut(&slot.type_id) {
                        remove_ordered(keys, key);
                    }
                    let removed = RemovedComponent {
                        key,
                        owner: slot.owner,
                        system: slot.system,
                        type_id: slot.type_id,
                    };
                    report.components.push(removed);
                    if let Some(component) = slot.component {
                        report.retired.push((removed, component));
                    }
                }
                Stage::Pending => {
                    self.init_components.retain(|&k| k != key);
                    report.discarded += 1;
                }
            }
        }

        report
    }

    /// Check a component out of the arena for a call needing `&mut World`
    pub(crate) fn take_component(&mut self, key: ComponentKey) -> Option<Box<dyn Component>> {
        self.components.get_mut(key)?.component.take()
    }

    /// Return a checked-out component
    pub(crate) fn restore_component(&mut self, key: ComponentKey, component: Box<dyn Component>) {
        if let Some(slot) = self.components.get_mut(key) {
            slot.component = Some(component);
        }
    }

    // ---------------------------------------------------------------------
    // Entity queries
    // ---------------------------------------------------------------------

    /// Entity exists in any stage (pending or live)
    pub fn exists(&self, entity: EntityId) -> bool {
        self.entities.contains_key(entity)
    }

    /// Entity is committed
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|r| r.stage == Stage::Live)
    }

    /// Entity is queued for the kill phase
    pub fn is_doomed(&self, entity: EntityId) -> bool {
        self.entities.get(entity).is_some_and(|r| r.doomed)
    }

    /// Live entities
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .filter(|(_, r)| r.stage == Stage::Live)
            .map(|(id, _)| id)
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities().count()
    }

    /// Number of live components
    pub fn component_count(&self) -> usize {
        self.stores.iter().map(Vec::len).sum()
    }

    // ---------------------------------------------------------------------
    // Global component lookups (committed state only)
    // ---------------------------------------------------------------------

    /// Live components owned by a subsystem, in registration order
    pub fn components_by_system(&self, system: SystemId) -> &[ComponentKey] {
        &self.stores[system.index()]
    }

    /// Live components of exactly type `T`
    pub fn components_of_type<T: Component>(&self) -> impl Iterator<Item = ComponentHandle<T>> + '_ {
        self.by_type
            .get(&TypeId::of::<T>())
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|&key| ComponentHandle::new(key))
    }

    /// Live components of type `T` with their values
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (ComponentHandle<T>, &T)> + '_ {
        self.components_of_type::<T>()
            .filter_map(move |handle| self.get(handle).map(|c| (handle, c)))
    }

    /// First live component of a subsystem
    pub fn first_of_system(&self, system: SystemId) -> Option<ComponentKey> {
        self.stores[system.index()].first().copied()
    }

    /// First live component of type `T`
    pub fn first_of_type<T: Component>(&self) -> Option<ComponentHandle<T>> {
        self.components_of_type::<T>().next()
    }

    // ---------------------------------------------------------------------
    // Per-entity component lookups (linked state)
    // ---------------------------------------------------------------------

    fn linked(&self, entity: EntityId) -> impl Iterator<Item = (ComponentKey, &ComponentSlot)> + '_ {
        self.entities
            .get(entity)
            .map_or(&[][..], |r| r.components.as_slice())
            .iter()
            .filter_map(|&key| self.components.get(key).map(|slot| (key, slot)))
            .filter(|(_, slot)| slot.linked)
    }

    /// Linked components of an entity
    pub fn components_of(&self, entity: EntityId) -> Vec<ComponentKey> {
        self.linked(entity).map(|(key, _)| key).collect()
    }

    /// Linked components of an entity owned by `system`
    pub fn entity_components_by_system(&self, entity: EntityId, system: SystemId) -> Vec<ComponentKey> {
        self.linked(entity)
            .filter(|(_, slot)| slot.system == system)
            .map(|(key, _)| key)
            .collect()
    }

    /// Linked components of an entity of exactly type `T`
    pub fn entity_components_of_type<T: Component>(&self, entity: EntityId) -> Vec<ComponentHandle<T>> {
        let type_id = TypeId::of::<T>();
        self.linked(entity)
            .filter(|(_, slot)| slot.type_id == type_id)
            .map(|(key, _)| ComponentHandle::new(key))
            .collect()
    }

    /// First linked component of an entity owned by `system`
    pub fn entity_first_of_system(&self, entity: EntityId, system: SystemId) -> Option<ComponentKey> {
        self.linked(entity)
            .find(|(_, slot)| slot.system == system)
            .map(|(key, _)| key)
    }

    /// First linked component of an entity of type `T`
    pub fn entity_first_of_type<T: Component>(&self, entity: EntityId) -> Option<ComponentHandle<T>> {
        let type_id = TypeId::of::<T>();
        self.linked(entity)
            .find(|(_, slot)| slot.type_id == type_id)
            .map(|(key, _)| ComponentHandle::new(key))
    }

    /// The entity's designated spatial component
    pub fn spatial_of(&self, entity: EntityId) -> Option<ComponentHandle<SpatialComponent>> {
        self.entities.get(entity)?.spatial.map(ComponentHandle::new)
    }

    /// The entity's spatial component, borrowed
    pub fn spatial(&self, entity: EntityId) -> Option<&SpatialComponent> {
        self.get(self.spatial_of(entity)?)
    }

    /// The entity's spatial component, mutably borrowed
    pub fn spatial_mut(&mut self, entity: EntityId) -> Option<&mut SpatialComponent> {
        let handle = self.spatial_of(entity)?;
        self.get_mut(handle)
    }

    // ---------------------------------------------------------------------
    // Component access by handle
    // ---------------------------------------------------------------------

    /// Borrow a component by typed handle
    pub fn get<T: Component>(&self, handle: ComponentHandle<T>) -> Option<&T> {
        let component: &dyn Component = self.components.get(handle.key())?.component.as_deref()?;
        component.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow a component by typed handle
    pub fn get_mut<T: Component>(&mut self, handle: ComponentHandle<T>) -> Option<&mut T> {
        let component: &mut dyn Component = self.components.get_mut(handle.key())?.component.as_deref_mut()?;
        component.as_any_mut().downcast_mut::<T>()
    }

    /// Borrow a component without knowing its type
    pub fn get_dyn(&self, key: ComponentKey) -> Option<&dyn Component> {
        self.components.get(key)?.component.as_deref()
    }

    /// Type-check an untyped key
    pub fn typed<T: Component>(&self, key: ComponentKey) -> Option<ComponentHandle<T>> {
        let slot = self.components.get(key)?;
        (slot.type_id == TypeId::of::<T>()).then(|| ComponentHandle::new(key))
    }

    /// Entity owning a component
    pub fn owner(&self, key: ComponentKey) -> Option<EntityId> {
        self.components.get(key).map(|slot| slot.owner)
    }

    /// Subsystem a component belongs to
    pub fn system_of(&self, key: ComponentKey) -> Option<SystemId> {
        self.components.get(key).map(|slot| slot.system)
    }

    /// Concrete type name of a component, for diagnostics
    pub fn type_name_of(&self, key: ComponentKey) -> Option<&'static str> {
        self.components.get(key).map(|slot| slot.type_name)
    }

    /// Component is committed (initialized and registered). Stays true while
    /// it is checked out or queued for removal, until the kill phase drops it.
    pub fn is_live_component(&self, key: ComponentKey) -> bool {
        self.components.get(key).is_some_and(|slot| slot.stage == Stage::Live)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.entities.len())
            .field("components", &self.components.len())
            .field("pending_init", &(self.init_entities.len() + self.init_components.len()))
            .field("pending_kill", &(self.kill_entities.len() + self.kill_components.len()))
            .finish()
    }
}

fn remove_ordered(keys: &mut Vec<ComponentKey>, key: ComponentKey) {
    if let Some(pos) = keys.iter().position(|&k| k == key) {
        keys.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[derive(Debug, Default)]
    struct Marker(u32);

    impl Component for Marker {
        fn system_id(&self) -> SystemId {
            SystemId::GameLogic
        }
    }

    /// Run the registry-side half of an init phase (no `init` hooks)
    fn commit(registry: &mut Registry) {
        registry.promote_pending_entities();
        let batch = registry.take_init_batch();
        for &key in &batch {
            registry.link(key);
        }
        for &key in &batch {
            registry.register(key);
        }
    }

    #[test]
    fn pending_entities_are_invisible() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let handle = registry.add_component(e, Marker(1)).unwrap();

        assert!(registry.exists(e));
        assert!(!registry.is_alive(e));
        assert_eq!(registry.entity_count(), 0);
        assert!(registry.components_of(e).is_empty());
        assert!(registry.first_of_type::<Marker>().is_none());

        commit(&mut registry);
        assert!(registry.is_alive(e));
        assert_eq!(registry.first_of_type::<Marker>(), Some(handle));
        assert_eq!(registry.get(handle).map(|m| m.0), Some(1));
        assert_eq!(registry.components_by_system(SystemId::GameLogic), &[handle.key()]);
    }

    #[test]
    fn spatial_component_is_designated_on_link() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let spatial = registry.add_component(e, SpatialComponent::at(Vec3::new(1.0, 2.0, 3.0))).unwrap();
        assert!(registry.spatial_of(e).is_none());

        commit(&mut registry);
        assert_eq!(registry.spatial_of(e), Some(spatial));
        assert_eq!(registry.spatial(e).map(SpatialComponent::position), Some(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn kill_removes_entity_and_components() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let handle = registry.add_component(e, Marker(2)).unwrap();
        commit(&mut registry);

        assert!(registry.destroy_entity(e));
        assert!(!registry.destroy_entity(e));
        assert!(registry.is_alive(e));

        let report = registry.apply_kills();
        assert_eq!(report.entities, vec![e]);
        assert_eq!(report.components.len(), 1);
        assert!(!registry.exists(e));
        assert!(registry.get(handle).is_none());
        assert!(registry.components_by_system(SystemId::GameLogic).is_empty());
        assert!(!registry.destroy_entity(e));
    }

    #[test]
    fn liveness_spans_commit_to_kill() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let handle = registry.add_component(e, Marker(4)).unwrap();
        assert!(!registry.is_live_component(handle.key()));

        commit(&mut registry);
        assert!(registry.is_live_component(handle.key()));

        let checked_out = registry.take_component(handle.key()).unwrap();
        assert!(registry.is_live_component(handle.key()));
        registry.restore_component(handle.key(), checked_out);

        registry.remove_component(handle.key());
        assert!(registry.is_live_component(handle.key()));
        let report = registry.apply_kills();
        assert!(!registry.is_live_component(handle.key()));
        assert_eq!(report.retired.len(), 1);
    }

    #[test]
    fn destroyed_before_init_is_discarded() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.add_component(e, Marker(3)).unwrap();
        registry.destroy_entity(e);

        commit(&mut registry);
        assert!(!registry.is_alive(e));
        assert_eq!(registry.component_count(), 0);

        let report = registry.apply_kills();
        assert!(report.entities.is_empty());
        assert_eq!(report.discarded, 2);
        assert!(!registry.has_pending_init());
    }

    #[test]
    fn removing_single_component_keeps_siblings() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let a = registry.add_component(e, Marker(1)).unwrap();
        let b = registry.add_component(e, Marker(2)).unwrap();
        commit(&mut registry);

        registry.remove_component(a.key());
        registry.apply_kills();
        assert_eq!(registry.entity_components_of_type::<Marker>(e), vec![b]);
        assert_eq!(registry.components_of_type::<Marker>().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.destroy_entity(e);
        registry.apply_kills();
        assert_eq!(registry.add_component(e, Marker(0)).unwrap_err(), RegistryError::UnknownEntity(e));
    }

    #[test]
    fn lookups_of_unregistered_types_are_empty() {
        let registry = Registry::new();
        assert_eq!(registry.components_of_type::<Marker>().count(), 0);
        assert!(registry.first_of_system(SystemId::Render).is_none());
    }
}
