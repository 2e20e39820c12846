//! Server-side mapping from method name to callable.
//!
//! Methods are registered one at a time with [`MethodRegistry::register_function`]
//! (or the [`MethodRegistry::register`] shorthand), or in bulk from a service
//! object through [`RpcService`]. Registering under an existing name replaces
//! the previous binding.

use std::any::type_name;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use wirecall_core::protocol::RESERVED_PREFIX;
use wirecall_core::{Args, Error, Result};

/// A callable that can be registered and invoked by name
pub trait RpcMethod: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, args: Args) -> Result<Value>;
}

pub type BoxedMethod = Box<dyn RpcMethod>;

type Handler = Box<dyn Fn(Args) -> Result<Value> + Send + Sync>;

/// Closure-backed method, built with [`function`]
pub struct Function {
    name: String,
    handler: Handler,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

impl RpcMethod for Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, args: Args) -> Result<Value> {
        (self.handler)(args)
    }
}

/// Wrap a closure as a named method.
///
/// The closure's error is reported to the caller by its `Display` text; its
/// result must serialize to JSON.
pub fn function<F, R, E>(name: impl Into<String>, f: F) -> Function
where
    F: Fn(Args) -> std::result::Result<R, E> + Send + Sync + 'static,
    R: Serialize,
    E: fmt::Display,
{
    let handler = move |args: Args| {
        let out = f(args).map_err(|e| Error::Dispatch(e.to_string()))?;
        serde_json::to_value(out)
            .map_err(|e| Error::dispatch(format!("result is not representable as JSON: {e}")))
    };
    Function {
        name: name.into(),
        handler: Box::new(handler),
    }
}

/// An object whose methods are registered together
///
/// ```
/// use std::sync::Arc;
/// use wirecall_rpc::registry::{BoxedMethod, RpcService, ServiceMethods};
///
/// struct Greeter {
///     greeting: String,
/// }
///
/// impl RpcService for Greeter {
///     fn methods(self: Arc<Self>) -> Vec<BoxedMethod> {
///         ServiceMethods::new(self)
///             .method("greet", |this, args| {
///                 let name: String = args.get(0, "name")?;
///                 Ok::<_, wirecall_core::Error>(format!("{} {name}", this.greeting))
///             })
///             .build()
///     }
/// }
/// ```
pub trait RpcService: Send + Sync + 'static {
    fn methods(self: Arc<Self>) -> Vec<BoxedMethod>;
}

/// Builder binding closures to a shared service instance
pub struct ServiceMethods<S> {
    service: Arc<S>,
    methods: Vec<BoxedMethod>,
}

impl<S: Send + Sync + 'static> ServiceMethods<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            methods: Vec::new(),
        }
    }

    pub fn method<F, R, E>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&S, Args) -> std::result::Result<R, E> + Send + Sync + 'static,
        R: Serialize,
        E: fmt::Display,
    {
        let service = Arc::clone(&self.service);
        let bound = function(name, move |args| f(&*service, args));
        self.methods.push(Box::new(bound));
        self
    }

    pub fn build(self) -> Vec<BoxedMethod> {
        self.methods
    }
}

#[derive(Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn RpcMethod>>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.method_names())
            .finish()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under its own name
    pub fn register_function(&mut self, method: impl RpcMethod + 'static) -> Result<()> {
        validate_name(method.name())?;
        self.insert(Arc::new(method));
        Ok(())
    }

    /// Register a closure under `name`
    pub fn register<F, R, E>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(Args) -> std::result::Result<R, E> + Send + Sync + 'static,
        R: Serialize,
        E: fmt::Display,
    {
        self.register_function(function(name, f))
    }

    /// Register every method a service exposes.
    ///
    /// Nothing is registered unless all names are valid. Returns how many
    /// methods were added.
    pub fn register_instance<S: RpcService>(&mut self, service: S) -> Result<usize> {
        let methods = Arc::new(service).methods();
        if methods.is_empty() {
            return Err(Error::InvalidRegistration(format!(
                "{} exposes no methods",
                type_name::<S>()
            )));
        }
        for method in &methods {
            validate_name(method.name())?;
        }

        let count = methods.len();
        for method in methods {
            self.insert(Arc::from(method));
        }
        Ok(count)
    }

    fn insert(&mut self, method: Arc<dyn RpcMethod>) {
        let name = method.name().to_string();
        if self.methods.insert(name.clone(), method).is_some() {
            debug!(method = %name, "replaced existing registration");
        }
    }

    /// Invoke `name` with `args`.
    ///
    /// A panic inside the method is reported as a dispatch error.
    pub fn dispatch(&self, name: &str, args: Args) -> Result<Value> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| Error::UnknownMethod(name.to_string()))?;

        match catch_unwind(AssertUnwindSafe(|| method.invoke(args))) {
            Ok(result) => result,
            Err(panic) => Err(Error::dispatch(format!(
                "method '{name}' panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    /// Registered names in sorted order
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRegistration(
            "method name must not be empty".to_string(),
        ));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidRegistration(format!(
            "method name {name:?} contains whitespace"
        )));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(Error::InvalidRegistration(format!(
            "method name {name:?} uses the reserved prefix {RESERVED_PREFIX:?}"
        )));
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
