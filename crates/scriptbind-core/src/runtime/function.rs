//! Native call handlers and the context they receive.

use std::fmt;
use std::rc::Rc;

use super::{ObjectId, Runtime};
use crate::error::ScriptError;
use crate::value::Value;

/// Type-erased native call handler.
///
/// Installed as an object's call handler or as a property accessor. Cloning
/// shares the underlying callable.
#[derive(Clone)]
pub struct NativeFn {
    name: Rc<str>,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    pub fn new<F>(name: impl Into<Rc<str>>, f: F) -> Self
    where
        F: Fn(&mut Runtime, &CallContext) -> Result<Value, ScriptError> + 'static,
    {
        Self::from_callable(name, f)
    }

    /// Wrap a custom [`NativeCallable`] implementation.
    pub fn from_callable<C>(name: impl Into<Rc<str>>, callable: C) -> Self
    where
        C: NativeCallable + 'static,
    {
        Self {
            name: name.into(),
            inner: Rc::new(callable),
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, rt: &mut Runtime, ctx: &CallContext) -> Result<Value, ScriptError> {
        self.inner.call(rt, ctx)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Anything the runtime can call.
pub trait NativeCallable {
    fn call(&self, rt: &mut Runtime, ctx: &CallContext) -> Result<Value, ScriptError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut Runtime, &CallContext) -> Result<Value, ScriptError>,
{
    fn call(&self, rt: &mut Runtime, ctx: &CallContext) -> Result<Value, ScriptError> {
        (self)(rt, ctx)
    }
}

/// Arguments and receiver of one native call.
#[derive(Debug, Clone)]
pub struct CallContext {
    this: Value,
    args: Vec<Value>,
    callee: ObjectId,
    construct: bool,
}

impl CallContext {
    pub fn new(callee: ObjectId, this: Value, args: Vec<Value>, construct: bool) -> Self {
        Self {
            this,
            args,
            callee,
            construct,
        }
    }

    /// The receiver: the new instance for construct calls.
    pub fn this(&self) -> &Value {
        &self.this
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument at `index`, or `None` if it was not supplied.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// The function object being called.
    pub fn callee(&self) -> ObjectId {
        self.callee
    }

    /// Whether this call came from [`Runtime::construct`].
    pub fn is_construct_call(&self) -> bool {
        self.construct
    }
}
