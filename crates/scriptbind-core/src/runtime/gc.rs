//! Reachability, finalizers and external memory pressure.
//!
//! Collection is mark/sweep from the global object and pinned objects.
//! Values captured inside native closures are invisible to the marker, so
//! embedders pin objects they hold on to (the binding layer pins every class
//! constructor and prototype it creates).
//!
//! Finalizers run for unreachable objects before any of them is freed, so a
//! finalizer can still read the object's internal slot.

use rustc_hash::FxHashSet;
use tracing::debug;

use super::{ObjectId, PropertyValue, Runtime};
use crate::error::ScriptError;
use crate::value::Value;

/// Callback run once when its object is found unreachable.
pub type Finalizer = Box<dyn FnOnce(&mut Runtime, ObjectId)>;

/// Summary of one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub live_before: usize,
    pub freed: usize,
    pub finalized: usize,
}

impl Runtime {
    /// Register (or replace) the finalizer of an object.
    pub fn set_finalizer(&mut self, id: ObjectId, finalizer: Finalizer) -> Result<(), ScriptError> {
        self.object(id)?;
        self.finalizers.insert(id, finalizer);
        Ok(())
    }

    pub fn has_finalizer(&self, id: ObjectId) -> bool {
        self.finalizers.contains_key(&id)
    }

    /// Keep an object alive regardless of reachability. Pins nest.
    pub fn pin(&mut self, id: ObjectId) {
        *self.pins.entry(id).or_insert(0) += 1;
    }

    /// Release one pin. Returns whether the object is still pinned.
    pub fn unpin(&mut self, id: ObjectId) -> bool {
        match self.pins.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.pins.remove(&id);
                false
            }
            None => false,
        }
    }

    pub fn is_pinned(&self, id: ObjectId) -> bool {
        self.pins.contains_key(&id)
    }

    /// Run a full collection.
    pub fn collect(&mut self) -> GcStats {
        #[cfg(feature = "profiling")]
        profiling::scope!("Runtime::collect");

        let live_before = self.heap.len();
        let marked = self.mark();
        let garbage: Vec<ObjectId> = self.heap.ids().filter(|id| !marked.contains(id)).collect();

        let mut finalized = 0;
        for id in &garbage {
            if let Some(finalizer) = self.finalizers.remove(id) {
                finalizer(self, *id);
                finalized += 1;
            }
        }

        let freed: Vec<_> = garbage.iter().filter_map(|id| self.heap.free(*id)).collect();
        let stats = GcStats {
            live_before,
            freed: freed.len(),
            finalized,
        };
        drop(freed);

        debug!(
            live_before = stats.live_before,
            freed = stats.freed,
            finalized = stats.finalized,
            external_memory = self.external_memory,
            "collection finished"
        );
        stats
    }

    fn mark(&self) -> FxHashSet<ObjectId> {
        let mut marked = FxHashSet::default();
        let mut pending: Vec<ObjectId> = Vec::with_capacity(self.pins.len() + 1);
        pending.push(self.global);
        pending.extend(self.pins.keys().copied());

        while let Some(id) = pending.pop() {
            if !marked.insert(id) {
                continue;
            }
            let Some(object) = self.heap.get(id) else {
                continue;
            };
            pending.extend(object.prototype);
            for property in object.properties.values() {
                if let PropertyValue::Data(value) = &property.value {
                    trace_value(value, &mut pending);
                }
            }
        }
        marked
    }

    /// Report native memory held on behalf of script objects. Returns the new total.
    pub fn adjust_external_memory(&mut self, delta: i64) -> i64 {
        self.external_memory += delta;
        self.external_memory
    }

    pub fn external_memory(&self) -> i64 {
        self.external_memory
    }

    /// Whether external memory exceeds the configured limit.
    pub fn should_collect(&self) -> bool {
        self.external_memory > self.options.external_memory_limit
    }

    /// Collect if external memory pressure asks for it.
    pub fn maybe_collect(&mut self) -> Option<GcStats> {
        if self.should_collect() {
            Some(self.collect())
        } else {
            None
        }
    }
}

fn trace_value(value: &Value, pending: &mut Vec<ObjectId>) {
    match value {
        Value::Object(id) => pending.push(*id),
        Value::Array(items) => items.iter().for_each(|item| trace_value(item, pending)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::runtime::{PropertyFlags, RuntimeOptions};

    #[test]
    fn unreachable_objects_are_freed() {
        let mut rt = Runtime::new();
        let orphan = rt.new_object();
        let stats = rt.collect();
        assert_eq!(stats.freed, 1);
        assert!(!rt.is_alive(orphan));
        assert!(rt.is_alive(rt.global()));
    }

    #[test]
    fn reachable_through_global_and_arrays() {
        let mut rt = Runtime::new();
        let a = rt.new_object();
        let b = rt.new_object();
        let global = rt.global();
        rt.define_value(global, "a", Value::Object(a), PropertyFlags::empty()).unwrap();
        rt.define_value(a, "list", Value::Array(vec![Value::Object(b)]), PropertyFlags::empty())
            .unwrap();
        rt.collect();
        assert!(rt.is_alive(a));
        assert!(rt.is_alive(b));
    }

    #[test]
    fn prototypes_are_traced() {
        let mut rt = Runtime::new();
        let proto = rt.new_object();
        let obj = rt.new_object_with_prototype(Some(proto));
        rt.pin(obj);
        rt.collect();
        assert!(rt.is_alive(proto));
    }

    #[test]
    fn pins_nest() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        rt.pin(obj);
        rt.pin(obj);
        assert!(rt.unpin(obj));
        rt.collect();
        assert!(rt.is_alive(obj));
        assert!(!rt.unpin(obj));
        rt.collect();
        assert!(!rt.is_alive(obj));
    }

    #[test]
    fn finalizer_runs_once_with_live_object() {
        let mut rt = Runtime::new();
        let obj = rt.new_object();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        rt.set_finalizer(
            obj,
            Box::new(move |rt: &mut Runtime, id: ObjectId| {
                assert!(rt.is_alive(id));
                seen.set(seen.get() + 1);
            }),
        )
        .unwrap();

        let stats = rt.collect();
        assert_eq!(stats.finalized, 1);
        rt.collect();
        assert_eq!(calls.get(), 1);
        assert!(!rt.has_finalizer(obj));
    }

    #[test]
    fn memory_pressure_triggers_collection() {
        let mut rt = Runtime::with_options(RuntimeOptions::default().with_external_memory_limit(100));
        assert!(rt.maybe_collect().is_none());
        assert_eq!(rt.adjust_external_memory(150), 150);
        assert!(rt.should_collect());
        assert!(rt.maybe_collect().is_some());
        rt.adjust_external_memory(-150);
        assert_eq!(rt.external_memory(), 0);
    }
}
