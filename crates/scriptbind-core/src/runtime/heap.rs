//! Generational arena of runtime objects.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::function::NativeFn;
use super::property::Property;
use crate::object::NativeObject;

/// Handle to an object in the runtime heap.
///
/// Copyable; the generation detects handles that outlived their object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// A heap object: own properties, an optional prototype link, an optional
/// call handler and one internal slot for a native object.
#[derive(Default)]
pub struct ScriptObject {
    pub(crate) prototype: Option<ObjectId>,
    pub(crate) properties: FxHashMap<String, Property>,
    pub(crate) call: Option<NativeFn>,
    pub(crate) internal: Option<Rc<NativeObject>>,
    pub(crate) name: Option<String>,
}

impl ScriptObject {
    pub(crate) fn with_prototype(prototype: Option<ObjectId>) -> Self {
        Self {
            prototype,
            ..Self::default()
        }
    }
}

pub(crate) struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    object: Option<ScriptObject>,
}

impl ObjectHeap {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn allocate(&mut self, object: ScriptObject) -> ObjectId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            ObjectId::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
            });
            ObjectId::new(index, 0)
        }
    }

    pub(crate) fn get(&self, id: ObjectId) -> Option<&ScriptObject> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Option<&mut ScriptObject> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Remove an object, returning it so the caller decides when it drops.
    pub(crate) fn free(&mut self, id: ObjectId) -> Option<ScriptObject> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.live -= 1;
        Some(object)
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object
                .as_ref()
                .map(|_| ObjectId::new(index as u32, slot.generation))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slot_count", &self.slots.len())
            .field("live", &self.live)
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_get() {
        let mut heap = ObjectHeap::with_capacity(4);
        let id = heap.allocate(ScriptObject::default());
        assert!(heap.get(id).is_some());
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn stale_handle_after_free() {
        let mut heap = ObjectHeap::with_capacity(4);
        let id = heap.allocate(ScriptObject::default());
        assert!(heap.free(id).is_some());
        assert!(heap.get(id).is_none());
        assert!(heap.free(id).is_none());

        let reused = heap.allocate(ScriptObject::default());
        assert_eq!(reused.index(), id.index());
        assert_ne!(reused.generation(), id.generation());
        assert!(heap.get(id).is_none());
        assert!(heap.get(reused).is_some());
    }

    #[test]
    fn ids_lists_live_objects() {
        let mut heap = ObjectHeap::with_capacity(4);
        let a = heap.allocate(ScriptObject::default());
        let b = heap.allocate(ScriptObject::default());
        heap.free(a);
        let ids: Vec<_> = heap.ids().collect();
        assert_eq!(ids, vec![b]);
        assert_eq!(heap.len(), 1);
    }
}
