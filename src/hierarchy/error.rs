//! Error types for hierarchy operations

use thiserror::Error;

/// Errors raised by the instance registry.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// An instance with the same id is already registered
    #[error("Instance '{0}' already registered")]
    DuplicateInstance(String),

    /// No instance with the given id exists
    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    /// The named parent does not exist
    #[error("Parent instance '{0}' not found")]
    ParentNotFound(String),

    /// A child's scope must be strictly narrower than its parent's
    #[error("Instance '{child}' ({child_scope}) cannot be a child of '{parent}' ({parent_scope}): scope must strictly narrow")]
    ScopeViolation {
        child: String,
        child_scope: String,
        parent: String,
        parent_scope: String,
    },

    /// Only instances with no parent may have Global scope, and vice versa
    #[error("Instance '{0}' must be Global-scoped if and only if it has no parent")]
    RootScopeMismatch(String),

    /// Reparenting would create a cycle
    #[error("Moving instance '{0}' under '{1}' would create a cycle")]
    CycleDetected(String, String),

    /// An instance with registered children cannot be removed
    #[error("Instance '{0}' still has children")]
    HasChildren(String),
}
