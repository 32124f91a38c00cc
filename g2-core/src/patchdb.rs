//! Thread-safe store of modules and cables.
//!
//! `spec.md` §4.4 describes a recursive-mutex walk API where `delete_module`
//! rewinds an in-progress walk to its predecessor. §9's design notes call
//! out that the recursive mutex is only needed because the original C
//! walk API hands back *references* into the locked structure; the
//! recommended rewrite — which this module follows — has walks hand back
//! owned copies instead, so a plain `std::sync::Mutex` held for the
//! walk's lifetime (via RAII guard) is sufficient and no reentrant
//! locking ever happens.
//!
//! `begin_walk_modules`/`begin_walk_cables` correspond to spec's
//! `reset_walk_module`/`reset_walk_cable`: they acquire the lock and
//! return a guard. `ModuleWalk::next`/`CableWalk::next` are
//! `walk_next_module`/`walk_next_cable`. Dropping the guard is
//! `finish_walk_module`/`finish_walk_cable` — releasing the lock.

use crate::model::{Cable, CableKey, Location, Module, ModuleKey, Slot};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type Bucket<K> = HashMap<(Slot, Location), Vec<K>>;

#[derive(Default)]
struct Inner {
    modules: HashMap<ModuleKey, Module>,
    module_order: Bucket<ModuleKey>,
    cables: HashMap<CableKey, Cable>,
    cable_order: Bucket<CableKey>,
}

/// The patch database: all modules and cables across all four slots.
#[derive(Default)]
pub struct PatchDb {
    inner: Mutex<Inner>,
}

impl PatchDb {
    pub fn new() -> Self {
        PatchDb::default()
    }

    pub fn read_module(&self, key: ModuleKey) -> Option<Module> {
        self.inner.lock().unwrap().modules.get(&key).cloned()
    }

    /// Insert if absent, otherwise overwrite in place. Overwriting never
    /// moves the entry's position in the insertion-ordered bucket, so an
    /// in-progress walk sees the update without its cursor skipping or
    /// repeating anything.
    pub fn write_module(&self, module: Module) {
        let mut inner = self.inner.lock().unwrap();
        let key = module.key;
        if !inner.modules.contains_key(&key) {
            inner.module_order.entry((key.slot, key.location)).or_default().push(key);
        }
        inner.modules.insert(key, module);
    }

    pub fn delete_module(&self, key: ModuleKey) -> Option<Module> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.modules.remove(&key);
        if removed.is_some() {
            if let Some(bucket) = inner.module_order.get_mut(&(key.slot, key.location)) {
                bucket.retain(|k| *k != key);
            }
        }
        removed
    }

    pub fn read_cable(&self, key: CableKey) -> Option<Cable> {
        self.inner.lock().unwrap().cables.get(&key).copied()
    }

    pub fn write_cable(&self, cable: Cable) {
        let mut inner = self.inner.lock().unwrap();
        let key = cable.key;
        if !inner.cables.contains_key(&key) {
            inner.cable_order.entry((key.slot, key.location)).or_default().push(key);
        }
        inner.cables.insert(key, cable);
    }

    pub fn delete_cable(&self, key: CableKey) -> Option<Cable> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.cables.remove(&key);
        if removed.is_some() {
            if let Some(bucket) = inner.cable_order.get_mut(&(key.slot, key.location)) {
                bucket.retain(|k| *k != key);
            }
        }
        removed
    }

    /// Bulk removal of every module in `slot`, across all locations. Used
    /// when the device reports a patch change (`spec.md` §4.6 Stop state).
    pub fn clear_modules(&self, slot: Slot) {
        let mut inner = self.inner.lock().unwrap();
        inner.modules.retain(|k, _| k.slot != slot);
        inner.module_order.retain(|(s, _), _| *s != slot);
    }

    pub fn clear_cables(&self, slot: Slot) {
        let mut inner = self.inner.lock().unwrap();
        inner.cables.retain(|k, _| k.slot != slot);
        inner.cable_order.retain(|(s, _), _| *s != slot);
    }

    /// Begin a walk over every module in `(slot, location)`, in
    /// insertion order. Holds the DB lock until the returned guard is
    /// dropped — callers must not perform I/O while it's alive.
    pub fn begin_walk_modules(&self, slot: Slot, location: Location) -> ModuleWalk<'_> {
        let guard = self.inner.lock().unwrap();
        ModuleWalk { guard, slot, location, pos: 0 }
    }

    pub fn begin_walk_cables(&self, slot: Slot, location: Location) -> CableWalk<'_> {
        let guard = self.inner.lock().unwrap();
        CableWalk { guard, slot, location, pos: 0 }
    }
}

/// A brief, in-lock traversal of one (slot, location)'s modules.
pub struct ModuleWalk<'a> {
    guard: MutexGuard<'a, Inner>,
    slot: Slot,
    location: Location,
    pos: usize,
}

impl ModuleWalk<'_> {
    /// Returns the next live module, or `None` once the bucket is
    /// exhausted.
    pub fn next(&mut self) -> Option<Module> {
        loop {
            let bucket = self.guard.module_order.get(&(self.slot, self.location))?;
            let key = *bucket.get(self.pos)?;
            self.pos += 1;
            if let Some(m) = self.guard.modules.get(&key) {
                return Some(m.clone());
            }
            // Key was tombstoned by a concurrent delete_current before we
            // reached it; skip and keep scanning.
        }
    }

    /// Delete the module most recently returned by `next`, rewinding the
    /// cursor so the following `next` call returns what would have been
    /// this entry's successor (`spec.md` §4.4, §8 property 5).
    pub fn delete_current(&mut self) -> Option<Module> {
        if self.pos == 0 {
            return None;
        }
        let idx = self.pos - 1;
        let key = {
            let bucket = self.guard.module_order.get_mut(&(self.slot, self.location))?;
            if idx >= bucket.len() {
                return None;
            }
            bucket.remove(idx)
        };
        self.pos = idx;
        self.guard.modules.remove(&key)
    }
}

pub struct CableWalk<'a> {
    guard: MutexGuard<'a, Inner>,
    slot: Slot,
    location: Location,
    pos: usize,
}

impl CableWalk<'_> {
    pub fn next(&mut self) -> Option<Cable> {
        loop {
            let bucket = self.guard.cable_order.get(&(self.slot, self.location))?;
            let key = *bucket.get(self.pos)?;
            self.pos += 1;
            if let Some(c) = self.guard.cables.get(&key) {
                return Some(*c);
            }
        }
    }

    pub fn delete_current(&mut self) -> Option<Cable> {
        if self.pos == 0 {
            return None;
        }
        let idx = self.pos - 1;
        let key = {
            let bucket = self.guard.cable_order.get_mut(&(self.slot, self.location))?;
            if idx >= bucket.len() {
                return None;
            }
            bucket.remove(idx)
        };
        self.pos = idx;
        self.guard.cables.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkType;

    fn key(slot: Slot, location: Location, index: u8) -> ModuleKey {
        ModuleKey { slot, location, index }
    }

    fn module(slot: Slot, location: Location, index: u8) -> Module {
        Module::new(key(slot, location, index), 1, 4)
    }

    #[test]
    fn walk_returns_each_live_module_exactly_once() {
        let db = PatchDb::new();
        for i in 0..5 {
            db.write_module(module(0, Location::Voice, i));
        }
        let mut seen = Vec::new();
        let mut walk = db.begin_walk_modules(0, Location::Voice);
        while let Some(m) = walk.next() {
            seen.push(m.key.index);
        }
        drop(walk);
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn delete_during_walk_skips_to_successor() {
        let db = PatchDb::new();
        for i in 0..5 {
            db.write_module(module(0, Location::Voice, i));
        }
        let mut walk = db.begin_walk_modules(0, Location::Voice);
        assert_eq!(walk.next().unwrap().key.index, 0);
        assert_eq!(walk.next().unwrap().key.index, 1);
        // Delete the entry we just returned (index 1); next() should
        // give index 2, its former successor.
        let deleted = walk.delete_current().unwrap();
        assert_eq!(deleted.key.index, 1);
        assert_eq!(walk.next().unwrap().key.index, 2);
        assert_eq!(walk.next().unwrap().key.index, 3);
        assert_eq!(walk.next().unwrap().key.index, 4);
        assert_eq!(walk.next(), None);
    }

    #[test]
    fn delete_of_last_entry_during_walk_ends_iteration() {
        let db = PatchDb::new();
        for i in 0..3 {
            db.write_module(module(0, Location::Voice, i));
        }
        let mut walk = db.begin_walk_modules(0, Location::Voice);
        walk.next();
        walk.next();
        walk.next(); // returns index 2, the last one
        walk.delete_current();
        assert_eq!(walk.next(), None);
    }

    #[test]
    fn write_module_overwrite_preserves_walk_order() {
        let db = PatchDb::new();
        for i in 0..3 {
            db.write_module(module(0, Location::Voice, i));
        }
        let mut updated = module(0, Location::Voice, 1);
        updated.colour = 7;
        db.write_module(updated);

        let mut order = Vec::new();
        let mut walk = db.begin_walk_modules(0, Location::Voice);
        while let Some(m) = walk.next() {
            order.push(m.key.index);
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(db.read_module(key(0, Location::Voice, 1)).unwrap().colour, 7);
    }

    #[test]
    fn clear_modules_only_affects_named_slot() {
        let db = PatchDb::new();
        db.write_module(module(0, Location::Voice, 0));
        db.write_module(module(1, Location::Voice, 0));
        db.clear_modules(0);
        assert!(db.read_module(key(0, Location::Voice, 0)).is_none());
        assert!(db.read_module(key(1, Location::Voice, 0)).is_some());
    }

    #[test]
    fn cable_crud_round_trips() {
        let db = PatchDb::new();
        let ck = CableKey {
            slot: 0,
            location: Location::Voice,
            module_from_index: 1,
            connector_from_io_count: 0,
            link_type: LinkType::OutputToInput,
            module_to_index: 2,
            connector_to_io_count: 0,
        };
        db.write_cable(Cable { key: ck, colour: 3 });
        assert_eq!(db.read_cable(ck).unwrap().colour, 3);
        assert_eq!(db.delete_cable(ck).unwrap().colour, 3);
        assert!(db.read_cable(ck).is_none());
    }

    #[test]
    fn concurrent_writes_from_many_threads_all_land() {
        use std::sync::Arc;
        let db = Arc::new(PatchDb::new());
        let mut handles = Vec::new();
        for t in 0..8u8 {
            let db = Arc::clone(&db);
            handles.push(std::thread::spawn(move || {
                for i in 0..16u8 {
                    db.write_module(module(0, Location::Fx, t * 16 + i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut count = 0;
        let mut walk = db.begin_walk_modules(0, Location::Fx);
        while walk.next().is_some() {
            count += 1;
        }
        assert_eq!(count, 8 * 16);
    }
}
