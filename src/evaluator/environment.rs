use crate::ast::{NumberType, Value};
use crate::{Error, MAX_EVAL_DEPTH};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_ID: AtomicI64 = AtomicI64::new(0);

/// Fresh identifier for gensyms and syntax-quote activations
pub fn next_id() -> NumberType {
    NEXT_ID.fetch_add(1, Ordering::Relaxed) + 1
}

/// One local slot. `set_local` rewrites it in place, so every clone of the environment
/// that owns it (closures included) observes the new value.
struct Binding {
    name: String,
    value: RefCell<Value>,
}

impl Binding {
    fn new(name: &str, value: Value) -> Self {
        Binding {
            name: name.to_owned(),
            value: RefCell::new(value),
        }
    }

    fn current(&self) -> Value {
        self.value.borrow().clone()
    }
}

/// State shared by every environment derived from a common root
#[derive(Default)]
struct GlobalFrame {
    bindings: RefCell<HashMap<String, Value>>,
    call_depth: Cell<usize>,
    call_depth_limit: Cell<usize>,
}

/// Environment for variable bindings
///
/// Local bindings form a sequence (most recent last) that extension copies rather than
/// changes; the global frame is shared and mutated in place.
#[derive(Clone)]
pub struct Environment {
    locals: Rc<Vec<Binding>>,
    globals: Rc<GlobalFrame>,
    stack_depth: usize,
}

/// Environment as held by a closure: the global frame is referenced weakly, so storing
/// a closure in the frame it was defined in does not keep that frame alive.
#[derive(Clone)]
pub struct CapturedEnvironment {
    locals: Rc<Vec<Binding>>,
    globals: Weak<GlobalFrame>,
    stack_depth: usize,
}

impl CapturedEnvironment {
    /// Back to a usable environment, or `None` once every owner of the global frame
    /// has been dropped
    pub fn upgrade(&self) -> Option<Environment> {
        Some(Environment {
            locals: Rc::clone(&self.locals),
            globals: self.globals.upgrade()?,
            stack_depth: self.stack_depth,
        })
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let locals: Vec<&str> = self.locals.iter().map(|b| b.name.as_str()).collect();
        f.debug_struct("Environment")
            .field("locals", &locals)
            .field("globals", &self.globals.bindings.borrow().len())
            .field("stack_depth", &self.stack_depth)
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        let globals = GlobalFrame::default();
        globals.call_depth_limit.set(MAX_EVAL_DEPTH);
        Environment {
            locals: Rc::new(Vec::new()),
            globals: Rc::new(globals),
            stack_depth: 0,
        }
    }

    /// New environment with `name` bound locally. A prior local binding of the same name
    /// is dropped, not shadowed.
    pub fn extend(&self, name: &str, value: Value) -> Environment {
        let mut locals: Vec<Binding> = self
            .locals
            .iter()
            .filter(|binding| binding.name != name)
            .map(|binding| Binding::new(&binding.name, binding.current()))
            .collect();
        locals.push(Binding::new(name, value));

        Environment {
            locals: Rc::new(locals),
            globals: Rc::clone(&self.globals),
            stack_depth: self.stack_depth,
        }
    }

    pub fn downgrade(&self) -> CapturedEnvironment {
        CapturedEnvironment {
            locals: Rc::clone(&self.locals),
            globals: Rc::downgrade(&self.globals),
            stack_depth: self.stack_depth,
        }
    }

    /// Install or replace a global binding, visible through every environment sharing
    /// this global frame.
    pub fn set_global(&self, name: &str, value: Value) {
        self.globals
            .bindings
            .borrow_mut()
            .insert(name.to_owned(), value);
    }

    /// Local bindings first (most recent wins), then the global frame
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        if let Some(binding) = self.local(name) {
            return Ok(binding.current());
        }

        self.globals
            .bindings
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnboundName(name.to_owned()))
    }

    /// Rebind the nearest local binding of `name`. Globals are never consulted.
    pub fn set_local(&self, name: &str, value: Value) -> Result<(), Error> {
        let binding = self
            .local(name)
            .ok_or_else(|| Error::AssignmentError(name.to_owned()))?;
        *binding.value.borrow_mut() = value;
        Ok(())
    }

    fn local(&self, name: &str) -> Option<&Binding> {
        self.locals.iter().rev().find(|b| b.name == name)
    }

    pub fn includes(&self, name: &str) -> bool {
        self.globals.bindings.borrow().contains_key(name) || self.includes_local(name)
    }

    pub fn includes_local(&self, name: &str) -> bool {
        self.local(name).is_some()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    pub fn increase_stack_depth(&mut self) {
        self.stack_depth += 1;
    }

    /// Names bound in the global frame, sorted
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.bindings.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Change the nesting limit for every environment sharing this global frame
    pub fn set_call_depth_limit(&self, limit: usize) {
        self.globals.call_depth_limit.set(limit);
    }

    pub fn call_depth_limit(&self) -> usize {
        self.globals.call_depth_limit.get()
    }

    /// Record one more nested list evaluation on the native stack. The returned guard
    /// releases it when dropped.
    pub(crate) fn enter_call(&self) -> Result<CallGuard<'_>, Error> {
        let frame = &*self.globals;
        let depth = frame.call_depth.get();
        let limit = frame.call_depth_limit.get();
        if depth >= limit {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {limit})"
            )));
        }
        frame.call_depth.set(depth + 1);
        Ok(CallGuard { frame })
    }

    /// Clear the `letrec` slots named in `names` when the only things still holding
    /// this environment are the closures stored in those slots. Each such closure
    /// captures the environment it is stored in, so without this the group would keep
    /// itself alive forever.
    pub(crate) fn release_recursive(&self, names: &[String]) {
        let mut self_captures = 0;
        for binding in self.locals.iter().filter(|b| names.contains(&b.name)) {
            if let Value::Closure(closure) = &*binding.value.borrow() {
                if Rc::strong_count(closure) > 1 {
                    // escaped into a result, a global or another binding
                    return;
                }
                if Rc::ptr_eq(&closure.env.locals, &self.locals) {
                    self_captures += 1;
                }
            }
        }

        if Rc::strong_count(&self.locals) != self_captures + 1 {
            return;
        }
        for binding in self.locals.iter().filter(|b| names.contains(&b.name)) {
            *binding.value.borrow_mut() = Value::Unbound;
        }
    }
}

pub(crate) struct CallGuard<'a> {
    frame: &'a GlobalFrame,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let depth = self.frame.call_depth.get();
        self.frame.call_depth.set(depth.saturating_sub(1));
    }
}
