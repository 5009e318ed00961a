//! Immutable binding metadata
//!
//! [`ResourceMetaData`] describes one binding: its name, the declared object
//! type, the capabilities the object must expose, its dependencies, and the
//! collaborators (source, pool, recycle routine, oversight evaluator) every
//! container built from it shares. Metadata is built once, validated, and
//! then only read.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{BoxError, Error};
use crate::object::ManagedObject;
use crate::oversight::OversightEvaluator;
use crate::pool::ManagedObjectPool;
use crate::recycle::RecycleRoutine;
use crate::source::ManagedObjectSource;

/// Shared value handed to a coordinating object for one dependency.
pub type DependencyValue = Arc<dyn Any + Send + Sync>;

type Accessor =
    Arc<dyn Fn(Arc<dyn ManagedObject>) -> Result<DependencyValue, BoxError> + Send + Sync>;

/// One dependency of a coordinating binding.
///
/// The accessor is resolved when the metadata is built, so injection never
/// inspects types at runtime beyond the final downcast.
#[derive(Clone)]
pub struct DependencyMeta {
    name: String,
    object_type: String,
    accessor: Accessor,
}

impl DependencyMeta {
    /// Depend on the dependency's object itself.
    pub fn new(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_type: object_type.into(),
            accessor: Arc::new(|object: Arc<dyn ManagedObject>| Ok(object.into_any())),
        }
    }

    /// Depend on a value extracted from the dependency's object.
    pub fn with_accessor<F>(
        name: impl Into<String>,
        object_type: impl Into<String>,
        accessor: F,
    ) -> Self
    where
        F: Fn(Arc<dyn ManagedObject>) -> Result<DependencyValue, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            object_type: object_type.into(),
            accessor: Arc::new(accessor),
        }
    }

    /// Dependency name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared object type of the dependency.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Extract the injected value from the dependency's object.
    pub fn resolve(&self, object: Arc<dyn ManagedObject>) -> Result<DependencyValue, BoxError> {
        (self.accessor)(object)
    }
}

impl fmt::Debug for DependencyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyMeta")
            .field("name", &self.name)
            .field("object_type", &self.object_type)
            .finish_non_exhaustive()
    }
}

/// Capabilities a binding declares for its objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Capabilities {
    /// Objects receive their binding name.
    pub name_aware: bool,
    /// Objects perform asynchronous operations.
    pub asynchronous: bool,
    /// Objects receive dependencies.
    pub coordinating: bool,
}

/// Everything a container needs to know about a binding.
pub struct ResourceMetaData {
    binding: Arc<str>,
    object_type: String,
    timeout: Option<Duration>,
    capabilities: Capabilities,
    dependencies: Vec<DependencyMeta>,
    source: Arc<dyn ManagedObjectSource>,
    pool: Option<Arc<dyn ManagedObjectPool>>,
    recycle: Option<Arc<dyn RecycleRoutine>>,
    oversight: Option<Arc<dyn OversightEvaluator>>,
}

impl ResourceMetaData {
    /// Start building metadata for `binding`.
    pub fn builder(
        binding: impl Into<String>,
        source: Arc<dyn ManagedObjectSource>,
    ) -> MetaDataBuilder {
        MetaDataBuilder::new(binding.into(), source)
    }

    /// Binding name.
    #[must_use]
    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub(crate) fn binding_arc(&self) -> Arc<str> {
        Arc::clone(&self.binding)
    }

    /// Declared object type, for diagnostics.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Timeout applied to sourcing and to each asynchronous operation.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether objects are told their binding name.
    #[must_use]
    pub fn is_name_aware(&self) -> bool {
        self.capabilities.name_aware
    }

    /// Whether objects perform asynchronous operations.
    #[must_use]
    pub fn is_asynchronous(&self) -> bool {
        self.capabilities.asynchronous
    }

    /// Whether objects receive dependencies.
    #[must_use]
    pub fn is_coordinating(&self) -> bool {
        self.capabilities.coordinating
    }

    /// Whether objects are obtained from a pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Whether released objects go through a recycle routine.
    #[must_use]
    pub fn is_recycled(&self) -> bool {
        self.recycle.is_some()
    }

    /// Dependencies in index order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencyMeta] {
        &self.dependencies
    }

    /// Index of the dependency named `name`.
    #[must_use]
    pub fn dependency_index(&self, name: &str) -> Option<usize> {
        self.dependencies.iter().position(|dep| dep.name == name)
    }

    /// The object source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn ManagedObjectSource> {
        &self.source
    }

    /// The pool, if the binding is pooled.
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<dyn ManagedObjectPool>> {
        self.pool.as_ref()
    }

    /// The recycle routine, if any.
    #[must_use]
    pub fn recycle(&self) -> Option<&Arc<dyn RecycleRoutine>> {
        self.recycle.as_ref()
    }

    /// The oversight evaluator, if any.
    #[must_use]
    pub fn oversight(&self) -> Option<&Arc<dyn OversightEvaluator>> {
        self.oversight.as_ref()
    }

    /// The first declared capability `object` does not expose.
    pub(crate) fn missing_capability(&self, object: &dyn ManagedObject) -> Option<&'static str> {
        if self.capabilities.name_aware && object.name_aware().is_none() {
            return Some("NameAware");
        }
        if self.capabilities.asynchronous && object.asynchronous().is_none() {
            return Some("AsynchronousObject");
        }
        if self.capabilities.coordinating && object.coordinating().is_none() {
            return Some("CoordinatingObject");
        }
        None
    }
}

impl fmt::Debug for ResourceMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMetaData")
            .field("binding", &self.binding)
            .field("object_type", &self.object_type)
            .field("timeout", &self.timeout)
            .field("capabilities", &self.capabilities)
            .field("dependencies", &self.dependencies)
            .field("pooled", &self.is_pooled())
            .field("recycled", &self.is_recycled())
            .field("overseen", &self.oversight.is_some())
            .finish()
    }
}

/// Builder for [`ResourceMetaData`].
pub struct MetaDataBuilder {
    binding: String,
    object_type: Option<String>,
    timeout: Option<Duration>,
    capabilities: Capabilities,
    dependencies: Vec<DependencyMeta>,
    source: Arc<dyn ManagedObjectSource>,
    pool: Option<Arc<dyn ManagedObjectPool>>,
    recycle: Option<Arc<dyn RecycleRoutine>>,
    oversight: Option<Arc<dyn OversightEvaluator>>,
}

impl MetaDataBuilder {
    fn new(binding: String, source: Arc<dyn ManagedObjectSource>) -> Self {
        Self {
            binding,
            object_type: None,
            timeout: None,
            capabilities: Capabilities::default(),
            dependencies: Vec::new(),
            source,
            pool: None,
            recycle: None,
            oversight: None,
        }
    }

    /// Start from a deserialized binding configuration.
    pub fn from_config(config: &BindingConfig, source: Arc<dyn ManagedObjectSource>) -> Self {
        let mut builder = Self::new(config.name.clone(), source);
        builder.object_type = config.object_type.clone();
        builder.timeout = config.timeout();
        builder.capabilities = config.capabilities;
        builder.dependencies = config
            .dependencies
            .iter()
            .map(|dep| DependencyMeta::new(dep.name.clone(), dep.object_type.clone()))
            .collect();
        builder
    }

    /// Declared object type; defaults to the binding name.
    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    /// Timeout for sourcing and for each asynchronous operation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declare the capability set in one go.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Objects receive their binding name.
    pub fn name_aware(mut self) -> Self {
        self.capabilities.name_aware = true;
        self
    }

    /// Objects perform asynchronous operations.
    pub fn asynchronous(mut self) -> Self {
        self.capabilities.asynchronous = true;
        self
    }

    /// Objects receive dependencies.
    pub fn coordinating(mut self) -> Self {
        self.capabilities.coordinating = true;
        self
    }

    /// Append a dependency; its index is its position.
    pub fn dependency(mut self, dependency: DependencyMeta) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Replace a dependency's descriptor by name, keeping its index.
    ///
    /// Used to attach an accessor to a dependency declared in configuration.
    pub fn replace_dependency(mut self, dependency: DependencyMeta) -> Self {
        match self
            .dependencies
            .iter_mut()
            .find(|existing| existing.name == dependency.name)
        {
            Some(existing) => *existing = dependency,
            None => self.dependencies.push(dependency),
        }
        self
    }

    /// Obtain objects from `pool` instead of the source.
    pub fn pool(mut self, pool: Arc<dyn ManagedObjectPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Pass released objects through `routine`.
    pub fn recycle(mut self, routine: Arc<dyn RecycleRoutine>) -> Self {
        self.recycle = Some(routine);
        self
    }

    /// Attach oversight rules computed by `evaluator`.
    pub fn oversight(mut self, evaluator: Arc<dyn OversightEvaluator>) -> Self {
        self.oversight = Some(evaluator);
        self
    }

    /// Validate and freeze the metadata.
    pub fn build(self) -> Result<Arc<ResourceMetaData>, Error> {
        if self.binding.trim().is_empty() {
            return Err(Error::configuration("binding name must not be empty"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::configuration(format!(
                "binding '{}': timeout must be greater than zero",
                self.binding
            )));
        }
        if !self.capabilities.coordinating && !self.dependencies.is_empty() {
            return Err(Error::configuration(format!(
                "binding '{}' declares dependencies but is not coordinating",
                self.binding
            )));
        }
        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep.name.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "binding '{}' has a dependency without a name",
                    self.binding
                )));
            }
            if !seen.insert(dep.name.as_str()) {
                return Err(Error::configuration(format!(
                    "binding '{}' declares dependency '{}' twice",
                    self.binding, dep.name
                )));
            }
        }

        let object_type = self.object_type.unwrap_or_else(|| self.binding.clone());
        Ok(Arc::new(ResourceMetaData {
            binding: Arc::from(self.binding),
            object_type,
            timeout: self.timeout,
            capabilities: self.capabilities,
            dependencies: self.dependencies,
            source: self.source,
            pool: self.pool,
            recycle: self.recycle,
            oversight: self.oversight,
        }))
    }
}

impl fmt::Debug for MetaDataBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDataBuilder")
            .field("binding", &self.binding)
            .field("object_type", &self.object_type)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Serializable binding declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BindingConfig {
    /// Binding name.
    pub name: String,
    /// Declared object type.
    #[cfg_attr(feature = "serde", serde(default))]
    pub object_type: Option<String>,
    /// Timeout in milliseconds; absent means unlimited.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timeout_ms: Option<u64>,
    /// Declared capabilities.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub capabilities: Capabilities,
    /// Dependencies in index order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dependencies: Vec<DependencyConfig>,
}

impl BindingConfig {
    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Serializable dependency declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DependencyConfig {
    /// Dependency name.
    pub name: String,
    /// Declared object type.
    pub object_type: String,
}
