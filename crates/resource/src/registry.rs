//! Dependency registries
//!
//! A [`DependencyRegistry`] maps each dependency index of a coordinating
//! binding to the container that provides it. It is fixed when the
//! container is created. During injection the resolved objects are handed
//! to the managed object through a borrowed [`ObjectRegistry`].

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::container::ManagedContainer;
use crate::error::{BoxError, Error};
use crate::metadata::{DependencyMeta, DependencyValue};

/// Containers providing a coordinating binding's dependencies, by index.
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    containers: Vec<ManagedContainer>,
}

impl DependencyRegistry {
    /// A registry without dependencies.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Containers listed in dependency index order.
    pub fn ordered(containers: impl IntoIterator<Item = ManagedContainer>) -> Self {
        Self {
            containers: containers.into_iter().collect(),
        }
    }

    /// Start binding containers to explicit indices.
    #[must_use]
    pub fn builder() -> DependencyRegistryBuilder {
        DependencyRegistryBuilder::default()
    }

    /// Number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether there are no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// The container at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ManagedContainer> {
        self.containers.get(index)
    }

    /// Containers in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedContainer> {
        self.containers.iter()
    }
}

/// Builder checking that dependency indices are dense and unique.
#[derive(Debug, Default)]
pub struct DependencyRegistryBuilder {
    bound: BTreeMap<usize, ManagedContainer>,
    duplicate: Option<usize>,
}

impl DependencyRegistryBuilder {
    /// Bind `container` to dependency `index`.
    pub fn bind(mut self, index: usize, container: ManagedContainer) -> Self {
        if self.bound.insert(index, container).is_some() {
            self.duplicate.get_or_insert(index);
        }
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DependencyRegistry, Error> {
        if let Some(index) = self.duplicate {
            return Err(Error::configuration(format!(
                "dependency index {index} is bound twice"
            )));
        }
        for (expected, index) in self.bound.keys().enumerate() {
            if *index != expected {
                return Err(Error::configuration(format!(
                    "dependency index {expected} is not bound"
                )));
            }
        }
        Ok(DependencyRegistry {
            containers: self.bound.into_values().collect(),
        })
    }
}

/// Resolved dependencies offered to a coordinating object.
#[derive(Debug)]
pub struct ObjectRegistry<'a> {
    binding: &'a str,
    dependencies: &'a [DependencyMeta],
    values: Vec<DependencyValue>,
}

impl<'a> ObjectRegistry<'a> {
    pub(crate) fn new(
        binding: &'a str,
        dependencies: &'a [DependencyMeta],
        values: Vec<DependencyValue>,
    ) -> Self {
        Self {
            binding,
            dependencies,
            values,
        }
    }

    /// The binding receiving the dependencies.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.binding
    }

    /// Number of dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The dependency descriptors, in index order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyMeta] {
        self.dependencies
    }

    /// The value injected for dependency `index`.
    pub fn get(&self, index: usize) -> Result<&DependencyValue, BoxError> {
        self.values.get(index).ok_or_else(|| {
            format!(
                "'{}' has no dependency at index {index} ({} declared)",
                self.binding,
                self.values.len()
            )
            .into()
        })
    }

    /// The value injected for dependency `index`, as a `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, BoxError> {
        let value = Arc::clone(self.get(index)?);
        value.downcast::<T>().map_err(|_| {
            let name = self
                .dependencies
                .get(index)
                .map_or("?", DependencyMeta::name);
            format!(
                "dependency '{name}' of '{}' is not a {}",
                self.binding,
                type_name::<T>()
            )
            .into()
        })
    }

    /// The value injected for the dependency named `name`, as a `T`.
    pub fn named<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, BoxError> {
        let index = self
            .dependencies
            .iter()
            .position(|dep| dep.name() == name)
            .ok_or_else(|| format!("'{}' has no dependency named '{name}'", self.binding))?;
        self.get_as(index)
    }
}
