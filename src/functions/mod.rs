//! Function-calling surface: descriptors, handlers and the registry.
//!
//! A session declares its locally available capabilities as a set of
//! [`FunctionDescriptor`]s transmitted in the start message. That set is the
//! complete vocabulary the remote model may invoke for the lifetime of the
//! session; the registry is immutable once a session starts.

pub mod broker;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use broker::InvocationBroker;

/// Primitive parameter types accepted by function descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 string value
    String,
    /// Numeric value (integer or float)
    Number,
    /// Boolean value
    Boolean,
}

/// A single parameter declaration for a function descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name, unique within the descriptor
    pub name: String,
    /// Primitive type of the parameter
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the remote side must supply this parameter
    pub required: bool,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declares a locally available capability the remote model may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Function name, unique within a session
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Ordered parameter specifications
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
}

impl FunctionDescriptor {
    /// Create a descriptor with no parameters.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter specification.
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(ParamSpec {
            name: name.into(),
            param_type,
            required,
            description: Some(description.into()),
        });
        self
    }
}

/// A remote request to execute a named capability.
#[derive(Debug, Clone)]
pub struct FunctionInvocation {
    /// Opaque call identifier, unique per invocation within the session
    pub call_id: String,
    /// Name of the function to execute
    pub function_name: String,
    /// Argument mapping supplied by the remote side
    pub arguments: Value,
}

/// Async handler backing a registered function.
///
/// Handlers may perform arbitrary I/O. A handler failure is isolated to its
/// call identifier: it produces an error-status result for that call and
/// never affects other in-flight invocations or the session.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Execute the function with the given arguments.
    async fn call(&self, arguments: Value) -> Result<Value, String>;
}

struct FnAdapter<F>(F);

#[async_trait]
impl<F, Fut> FunctionHandler for FnAdapter<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, String> {
        (self.0)(arguments).await
    }
}

/// Wrap an async closure as a [`FunctionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn FunctionHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(FnAdapter(f))
}

/// Capability table mapping function names to their handlers.
///
/// Populated before the session starts; the descriptor set it holds is sent
/// verbatim in the start message.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
    descriptors: Vec<FunctionDescriptor>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. A descriptor with a duplicate name replaces the
    /// previous registration.
    pub fn register(&mut self, descriptor: FunctionDescriptor, handler: Arc<dyn FunctionHandler>) {
        if self.handlers.insert(descriptor.name.clone(), handler).is_some() {
            tracing::warn!(name = %descriptor.name, "Replacing existing function registration");
            self.descriptors.retain(|d| d.name != descriptor.name);
        }
        self.descriptors.push(descriptor);
    }

    /// Look up a handler by function name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// The full descriptor set, in registration order.
    pub fn descriptors(&self) -> &[FunctionDescriptor] {
        &self.descriptors
    }

    /// Registered function names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
