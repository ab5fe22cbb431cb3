//! Destination hierarchy module.
//!
//! Provides thread-safe in-memory storage and querying of the instance tree
//! that tasks are routed across. Instances form a rooted tree: scope strictly
//! narrows from parent to child and ancestry is derived by parent-pointer
//! traversal rather than stored redundantly.

mod error;
mod instance;

pub use error::*;
pub use instance::*;

use dashmap::DashMap;

/// Thread-safe registry of destination instances.
///
/// Backed by lock-free concurrent maps (DashMap); reads hand out cloned
/// snapshots so callers never hold registry locks.
///
/// # Examples
///
/// ```
/// use trellis::hierarchy::{Instance, InstanceRegistry, InstanceScope};
///
/// let registry = InstanceRegistry::new();
/// let root = Instance::new("root", "Root", InstanceScope::Global, None, vec![], 100);
/// registry.add_instance(root).unwrap();
/// assert_eq!(registry.instance_count(), 1);
/// ```
pub struct InstanceRegistry {
    instances: DashMap<String, Instance>,
    children: DashMap<String, Vec<String>>,
}

impl InstanceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            children: DashMap::new(),
        }
    }

    /// Add a new instance to the registry.
    ///
    /// # Errors
    ///
    /// - `DuplicateInstance` if the id is already registered
    /// - `ParentNotFound` if `parent_id` names an unknown instance
    /// - `RootScopeMismatch` if a parentless instance is not Global-scoped,
    ///   or a Global-scoped instance has a parent
    /// - `ScopeViolation` if the scope does not strictly narrow from the parent
    pub fn add_instance(&self, instance: Instance) -> Result<(), HierarchyError> {
        let id = instance.id.clone();

        if self.instances.contains_key(&id) {
            return Err(HierarchyError::DuplicateInstance(id));
        }

        match &instance.parent_id {
            None => {
                if instance.scope != InstanceScope::Global {
                    return Err(HierarchyError::RootScopeMismatch(id));
                }
            }
            Some(parent_id) => {
                if instance.scope == InstanceScope::Global {
                    return Err(HierarchyError::RootScopeMismatch(id));
                }
                let parent = self
                    .instances
                    .get(parent_id)
                    .ok_or_else(|| HierarchyError::ParentNotFound(parent_id.clone()))?;
                if instance.scope.rank() <= parent.scope.rank() {
                    return Err(HierarchyError::ScopeViolation {
                        child: id.clone(),
                        child_scope: instance.scope.to_string(),
                        parent: parent_id.clone(),
                        parent_scope: parent.scope.to_string(),
                    });
                }
            }
        }

        if let Some(parent_id) = &instance.parent_id {
            self.children
                .entry(parent_id.clone())
                .or_default()
                .push(id.clone());
        }
        self.instances.insert(id, instance);
        Ok(())
    }

    /// Remove a leaf instance from the registry.
    ///
    /// # Errors
    ///
    /// Returns `HasChildren` if other instances still point at it, or
    /// `InstanceNotFound` if the id is unknown.
    pub fn remove_instance(&self, id: &str) -> Result<Instance, HierarchyError> {
        if self
            .children
            .get(id)
            .map(|c| !c.is_empty())
            .unwrap_or(false)
        {
            return Err(HierarchyError::HasChildren(id.to_string()));
        }

        let instance = self
            .instances
            .remove(id)
            .map(|(_, instance)| instance)
            .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string()))?;

        if let Some(parent_id) = &instance.parent_id {
            if let Some(mut siblings) = self.children.get_mut(parent_id) {
                siblings.retain(|cid| cid != id);
            }
        }
        self.children.remove(id);

        Ok(instance)
    }

    /// Get an instance snapshot by id.
    pub fn get_instance(&self, id: &str) -> Option<Instance> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshots of all registered instances.
    pub fn all_instances(&self) -> Vec<Instance> {
        self.instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered instances.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Direct children of an instance.
    pub fn children_of(&self, id: &str) -> Vec<Instance> {
        self.children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|cid| self.get_instance(cid))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All instances at a given scope.
    pub fn instances_by_scope(&self, scope: InstanceScope) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|entry| entry.value().scope == scope)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All instances currently able to accept delegations.
    pub fn accepting_instances(&self) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|entry| entry.value().status.accepts_delegations())
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Ancestor chain of an instance, nearest parent first.
    ///
    /// Traversal is bounded by the registry size, so a corrupted parent
    /// pointer cannot loop forever.
    pub fn ancestors(&self, id: &str) -> Result<Vec<Instance>, HierarchyError> {
        let mut current = self
            .get_instance(id)
            .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string()))?;

        let mut chain = Vec::new();
        let limit = self.instances.len();
        while let Some(parent_id) = current.parent_id.clone() {
            let parent = self
                .get_instance(&parent_id)
                .ok_or_else(|| HierarchyError::ParentNotFound(parent_id.clone()))?;
            chain.push(parent.clone());
            if chain.len() > limit {
                return Err(HierarchyError::CycleDetected(id.to_string(), parent_id));
            }
            current = parent;
        }
        Ok(chain)
    }

    /// The root ancestor of an instance (itself if parentless).
    pub fn root_of(&self, id: &str) -> Result<Instance, HierarchyError> {
        let ancestors = self.ancestors(id)?;
        match ancestors.into_iter().last() {
            Some(root) => Ok(root),
            None => self
                .get_instance(id)
                .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string())),
        }
    }

    /// Depth of an instance (root = 0).
    pub fn depth(&self, id: &str) -> Result<usize, HierarchyError> {
        Ok(self.ancestors(id)?.len())
    }

    /// Update the lifecycle status of an instance.
    pub fn update_status(&self, id: &str, status: InstanceStatus) -> Result<(), HierarchyError> {
        let mut instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string()))?;
        instance.status = status;
        Ok(())
    }

    /// Increment an instance's current load. Returns the new value.
    pub fn increment_load(&self, id: &str) -> Result<u32, HierarchyError> {
        let mut instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string()))?;
        instance.current_load += 1;
        Ok(instance.current_load)
    }

    /// Decrement an instance's current load, saturating at 0.
    ///
    /// If already at 0, logs a warning and returns 0.
    pub fn decrement_load(&self, id: &str) -> Result<u32, HierarchyError> {
        let mut instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| HierarchyError::InstanceNotFound(id.to_string()))?;
        if instance.current_load == 0 {
            tracing::warn!(
                instance_id = %id,
                "Attempted to decrement current_load when already at 0"
            );
            return Ok(0);
        }
        instance.current_load -= 1;
        Ok(instance.current_load)
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
