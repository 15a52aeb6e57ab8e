//! Capability registry.
//!
//! The catalog is built once at startup, then shared read-only with every
//! component that needs to look capabilities up.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::concurrency::run_with_concurrency_limit;

/// Arguments handed to a capability
///
/// Results of dependency steps travel in their own field, so no user-supplied
/// parameter name can shadow them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityArgs {
    /// Parameters chosen by the planner
    pub arguments: Map<String, Value>,

    /// Results of the step's dependencies, in ascending step order
    pub dependency_results: Vec<Value>,
}

impl CapabilityArgs {
    pub fn new(arguments: Map<String, Value>, dependency_results: Vec<Value>) -> Self {
        Self {
            arguments,
            dependency_results,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// A named, independently invocable unit of work
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used by plans
    fn name(&self) -> &str;

    /// What the capability does (shown to the oracle)
    fn description(&self) -> &str;

    /// JSON schema of accepted arguments (shown to the oracle, never enforced)
    fn parameters(&self) -> &Value;

    /// Perform the work
    async fn invoke(&self, args: CapabilityArgs) -> Result<Value>;

    /// Check the capability is usable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Name/description/parameters triple used to prompt the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Capability backed by an async closure
pub struct FnCapability<F> {
    name: String,
    description: String,
    parameters: Value,
    handler: F,
}

impl<F, Fut> FnCapability<F>
where
    F: Fn(CapabilityArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Capability for FnCapability<F>
where
    F: Fn(CapabilityArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    async fn invoke(&self, args: CapabilityArgs) -> Result<Value> {
        (self.handler)(args).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Capability '{0}' is already registered")]
    Duplicate(String),

    #[error("Capability name cannot be empty")]
    EmptyName,
}

/// Read-only registry of capabilities keyed by name
#[derive(Clone, Default)]
pub struct CapabilityCatalog {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl fmt::Debug for CapabilityCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityCatalog")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    /// Descriptors for every capability, sorted by name
    pub fn describe(&self) -> Vec<CapabilityDescriptor> {
        self.capabilities
            .values()
            .map(|c| CapabilityDescriptor {
                name: c.name().to_string(),
                description: c.description().to_string(),
                parameters: c.parameters().clone(),
            })
            .collect()
    }

    /// Health-check every capability with at most `limit` checks in flight
    pub async fn health_check_all(&self, limit: i64) -> Vec<(String, Result<()>)> {
        let checks: Vec<_> = self
            .capabilities
            .values()
            .map(|capability| async move { capability.health_check().await })
            .collect();

        let outcomes = run_with_concurrency_limit(limit, checks).await;

        self.capabilities
            .keys()
            .cloned()
            .zip(outcomes.into_iter().map(|o| o.into_result()))
            .collect()
    }
}

/// Collects capabilities before the catalog is frozen
#[derive(Default)]
pub struct CatalogBuilder {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CatalogBuilder {
    /// Add a capability; names must be unique and non-empty
    pub fn register<C>(self, capability: C) -> Result<Self, CatalogError>
    where
        C: Capability + 'static,
    {
        self.register_arc(Arc::new(capability))
    }

    pub fn register_arc(mut self, capability: Arc<dyn Capability>) -> Result<Self, CatalogError> {
        let name = capability.name().to_string();
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.capabilities.contains_key(&name) {
            return Err(CatalogError::Duplicate(name));
        }
        self.capabilities.insert(name, capability);
        Ok(self)
    }

    pub fn build(self) -> CapabilityCatalog {
        CapabilityCatalog {
            capabilities: self.capabilities,
        }
    }
}
