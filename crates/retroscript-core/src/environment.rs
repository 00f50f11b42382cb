//! Lexical scope chain, stored in an arena owned by one interpreter.
//!
//! Frames reference their parent by [`EnvId`] and never their children, so
//! a function stored in the very environment it captured does not form an
//! `Rc` cycle. A frame that was never captured is freed as soon as the call
//! or loop iteration that created it finishes. Captured frames are swept by
//! [`Environments::collect`] once nothing that can still run refers to them.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::ast::FunctionDef;
use crate::value::{Closure, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(usize);

#[derive(Debug)]
struct Frame {
    bindings: IndexMap<String, Value>,
    parent: Option<EnvId>,
    /// The scope that opened this frame is still running.
    active: bool,
    /// A closure was created over this frame or one of its descendants.
    captured: bool,
    /// An event handler runs in this frame; kept for the arena's lifetime.
    pinned: bool,
}

#[derive(Debug)]
pub struct Environments {
    frames: Vec<Option<Frame>>,
    free: Vec<usize>,
    closures: Vec<Weak<Closure>>,
}

impl Default for Environments {
    fn default() -> Self {
        Self::new()
    }
}

impl Environments {
    /// Creates an arena holding a single root frame.
    pub fn new() -> Self {
        let root = Frame {
            bindings: IndexMap::new(),
            parent: None,
            active: true,
            captured: true,
            pinned: true,
        };
        Self {
            frames: vec![Some(root)],
            free: Vec::new(),
            closures: Vec::new(),
        }
    }

    pub fn root(&self) -> EnvId {
        EnvId(0)
    }

    fn frame(&self, id: EnvId) -> Option<&Frame> {
        self.frames.get(id.0).and_then(Option::as_ref)
    }

    fn frame_mut(&mut self, id: EnvId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Opens a new frame whose parent is `parent`.
    pub fn child(&mut self, parent: EnvId) -> EnvId {
        let frame = Frame {
            bindings: IndexMap::new(),
            parent: Some(parent),
            active: true,
            captured: false,
            pinned: false,
        };
        match self.free.pop() {
            Some(slot) => {
                self.frames[slot] = Some(frame);
                EnvId(slot)
            }
            None => {
                self.frames.push(Some(frame));
                EnvId(self.frames.len() - 1)
            }
        }
    }

    /// Ends the scope that opened `id`.
    ///
    /// Uncaptured frames are freed immediately. Captured ones stay until a
    /// collection finds them unreachable, which this triggers.
    pub fn release(&mut self, id: EnvId) {
        if id == self.root() {
            return;
        }
        let captured = match self.frame_mut(id) {
            Some(frame) => {
                frame.active = false;
                frame.captured
            }
            None => return,
        };
        if captured {
            self.collect();
        } else {
            self.free_slot(id.0);
        }
    }

    /// Creates a function value closing over `env`.
    pub fn close_over(&mut self, def: Rc<FunctionDef>, env: EnvId) -> Value {
        self.capture(env);
        let closure = Rc::new(Closure { def, env });
        self.closures.push(Rc::downgrade(&closure));
        Value::Function(closure)
    }

    fn capture(&mut self, id: EnvId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.frame_mut(current) {
                Some(frame) if !frame.captured => {
                    frame.captured = true;
                    cursor = frame.parent;
                }
                _ => break,
            }
        }
    }

    /// Keeps `id` and its ancestors alive for the lifetime of the arena.
    pub fn pin(&mut self, id: EnvId) {
        self.capture(id);
        if let Some(frame) = self.frame_mut(id) {
            frame.pinned = true;
        }
    }

    fn free_slot(&mut self, slot: usize) {
        if self.frames[slot].take().is_some() {
            self.free.push(slot);
        }
    }

    /// Frees every frame no longer reachable from a running scope, a pinned
    /// frame or a function value held outside the arena.
    ///
    /// A closure counts as held outside when its `Rc` has more owners than
    /// the arena's own bindings account for.
    pub fn collect(&mut self) {
        let mut internal: HashMap<*const Closure, usize> = HashMap::new();
        for frame in self.frames.iter().flatten() {
            for value in frame.bindings.values() {
                visit_closures(value, &mut |closure| {
                    *internal.entry(Rc::as_ptr(closure)).or_default() += 1;
                });
            }
        }

        let mut pending: Vec<EnvId> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.as_ref().is_some_and(|f| f.active || f.pinned))
            .map(|(slot, _)| EnvId(slot))
            .collect();
        self.closures.retain(|weak| weak.strong_count() > 0);
        for weak in &self.closures {
            if let Some(closure) = weak.upgrade() {
                // One owner is the upgrade itself
                let owners = Rc::strong_count(&closure) - 1;
                if owners > internal.get(&Rc::as_ptr(&closure)).copied().unwrap_or(0) {
                    pending.push(closure.env);
                }
            }
        }

        let mut marked = vec![false; self.frames.len()];
        while let Some(id) = pending.pop() {
            if marked.get(id.0).copied().unwrap_or(true) {
                continue;
            }
            let Some(frame) = self.frame(id) else { continue };
            marked[id.0] = true;
            pending.extend(frame.parent);
            for value in frame.bindings.values() {
                visit_closures(value, &mut |closure| pending.push(closure.env));
            }
        }

        for (slot, keep) in marked.into_iter().enumerate() {
            if !keep {
                self.free_slot(slot);
            }
        }
    }

    /// Finds the innermost frame in the chain that binds `name`.
    pub fn resolve(&self, id: EnvId, name: &str) -> Option<EnvId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let frame = self.frame(current)?;
            if frame.bindings.contains_key(name) {
                return Some(current);
            }
            cursor = frame.parent;
        }
        None
    }

    pub fn get(&self, id: EnvId, name: &str) -> Option<&Value> {
        let owner = self.resolve(id, name)?;
        self.frame(owner)?.bindings.get(name)
    }

    pub fn get_mut(&mut self, id: EnvId, name: &str) -> Option<&mut Value> {
        let owner = self.resolve(id, name)?;
        self.frame_mut(owner)?.bindings.get_mut(name)
    }

    /// Binds `name` in exactly this frame, shadowing any outer binding.
    pub fn define(&mut self, id: EnvId, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frame_mut(id) {
            frame.bindings.insert(name.into(), value);
        }
    }

    /// Overwrites an existing binding anywhere in the chain.
    ///
    /// Returns `false` when no frame binds `name`.
    pub fn assign(&mut self, id: EnvId, name: &str, value: Value) -> bool {
        match self.get_mut(id, name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Assignment semantics of `set`: update the reachable binding in place,
    /// or create it in the innermost frame.
    pub fn set(&mut self, id: EnvId, name: &str, value: Value) {
        if let Some(slot) = self.get_mut(id, name) {
            *slot = value;
        } else {
            self.define(id, name, value);
        }
    }

    /// The bindings of a single frame, in insertion order.
    pub fn bindings(&self, id: EnvId) -> IndexMap<String, Value> {
        self.frame(id).map(|f| f.bindings.clone()).unwrap_or_default()
    }

    /// Number of frames currently allocated.
    pub fn live_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }
}

/// Calls `f` for every function value reachable inside `value`.
fn visit_closures(value: &Value, f: &mut impl FnMut(&Rc<Closure>)) {
    match value {
        Value::Function(closure) => f(closure),
        Value::Array(items) => items.iter().for_each(|item| visit_closures(item, f)),
        Value::Object(fields) => fields.values().for_each(|item| visit_closures(item, f)),
        _ => {}
    }
}
