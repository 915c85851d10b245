//! Generic open-addressed hash table, the same shape as
//! `chunk::value::StringTable` but keyed by an already-interned string
//! (compared by pointer identity, which the intern guarantee makes safe)
//! and storing an arbitrary value. Used for the globals table.

use crate::chunk::value::{ObjString, Value};
use std::rc::Rc;

/// A binding in the globals table: the value plus whether it was declared
/// with `const`.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    pub value: Value,
    pub is_const: bool,
}

enum Slot<V> {
    Empty,
    Tombstone,
    Occupied(Rc<ObjString>, V),
}

pub struct Table<V> {
    entries: Vec<Slot<V>>,
    count: usize,
}

const INITIAL_CAPACITY: usize = 8;

impl<V> Table<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_slot(entries: &[Slot<V>], key: &Rc<ObjString>) -> usize {
        let cap = entries.len();
        let mut idx = key.hash as usize % cap;
        let mut first_tombstone = None;
        loop {
            match &entries[idx] {
                Slot::Empty => return first_tombstone.unwrap_or(idx),
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(idx);
                    }
                }
                Slot::Occupied(k, _) => {
                    if Rc::ptr_eq(k, key) {
                        return idx;
                    }
                }
            }
            idx = (idx + 1) % cap;
        }
    }

    fn grow(&mut self) {
        let new_cap = if self.capacity() == 0 {
            INITIAL_CAPACITY
        } else {
            self.capacity() * 2
        };
        let mut fresh = Vec::with_capacity(new_cap);
        fresh.resize_with(new_cap, || Slot::Empty);
        let old = std::mem::replace(&mut self.entries, fresh);
        self.count = 0;
        for slot in old {
            if let Slot::Occupied(k, v) = slot {
                let idx = Self::find_slot(&self.entries, &k);
                self.entries[idx] = Slot::Occupied(k, v);
                self.count += 1;
            }
        }
    }

    fn maybe_grow(&mut self) {
        if self.capacity() == 0 || (self.count + 1) as f64 / self.capacity() as f64 > 0.75 {
            self.grow();
        }
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<&V> {
        if self.capacity() == 0 {
            return None;
        }
        match &self.entries[Self::find_slot(&self.entries, key)] {
            Slot::Occupied(_, v) => Some(v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &Rc<ObjString>) -> Option<&mut V> {
        if self.capacity() == 0 {
            return None;
        }
        let idx = Self::find_slot(&self.entries, key);
        match &mut self.entries[idx] {
            Slot::Occupied(_, v) => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Rc<ObjString>) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `value` under `key`. Returns `true` if this created a new
    /// entry, `false` if it overwrote an existing one.
    pub fn set(&mut self, key: Rc<ObjString>, value: V) -> bool {
        self.maybe_grow();
        let idx = Self::find_slot(&self.entries, &key);
        let is_new = !matches!(self.entries[idx], Slot::Occupied(..));
        if is_new && !matches!(self.entries[idx], Slot::Tombstone) {
            self.count += 1;
        }
        self.entries[idx] = Slot::Occupied(key, value);
        is_new
    }

    /// Not exercised by the VM (the language has no `delete`), but kept as
    /// a complete table operation and covered by tests.
    pub fn delete(&mut self, key: &Rc<ObjString>) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let idx = Self::find_slot(&self.entries, key);
        if matches!(self.entries[idx], Slot::Occupied(..)) {
            self.entries[idx] = Slot::Tombstone;
            true
        } else {
            false
        }
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

pub type Globals = Table<GlobalEntry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::value::StringTable;

    #[test]
    fn set_then_get_round_trips() {
        let mut strings = StringTable::new();
        let key = strings.copy_string("x");
        let mut table: Table<GlobalEntry> = Table::new();
        let entry = GlobalEntry {
            value: Value::Number(1.0),
            is_const: false,
        };
        assert!(table.set(Rc::clone(&key), entry));
        assert_eq!(table.get(&key).unwrap().value, Value::Number(1.0));
    }

    #[test]
    fn set_again_reports_overwrite_not_new() {
        let mut strings = StringTable::new();
        let key = strings.copy_string("x");
        let mut table: Table<GlobalEntry> = Table::new();
        table.set(
            Rc::clone(&key),
            GlobalEntry {
                value: Value::Nil,
                is_const: false,
            },
        );
        let was_new = table.set(
            Rc::clone(&key),
            GlobalEntry {
                value: Value::Number(2.0),
                is_const: false,
            },
        );
        assert!(!was_new);
        assert_eq!(table.get(&key).unwrap().value, Value::Number(2.0));
    }

    #[test]
    fn delete_then_get_is_none_but_slot_is_reusable() {
        let mut strings = StringTable::new();
        let key = strings.copy_string("x");
        let mut table: Table<GlobalEntry> = Table::new();
        table.set(
            Rc::clone(&key),
            GlobalEntry {
                value: Value::Nil,
                is_const: false,
            },
        );
        assert!(table.delete(&key));
        assert!(table.get(&key).is_none());
        assert!(table.set(
            Rc::clone(&key),
            GlobalEntry {
                value: Value::Bool(true),
                is_const: false,
            }
        ));
    }

    #[test]
    fn survives_growth() {
        let mut strings = StringTable::new();
        let mut table: Table<GlobalEntry> = Table::new();
        let keys: Vec<_> = (0..200).map(|i| strings.copy_string(&format!("g{i}"))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(
                Rc::clone(k),
                GlobalEntry {
                    value: Value::Number(i as f64),
                    is_const: false,
                },
            );
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k).unwrap().value, Value::Number(i as f64));
        }
    }
}
