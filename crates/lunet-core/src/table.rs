//! Insertion-ordered table with array, string and generic key routing.
//!
//! All entries live in a single `IndexMap`, so traversal follows insertion
//! order. Keys are classified on the way in: positive integral numbers go to
//! [`TableKey::Index`], strings to [`TableKey::Str`], everything else to
//! [`TableKey::Generic`]. Assigning nil to a present key leaves a tombstone
//! behind so that `next` can continue from a key cleared mid-traversal.

use crate::coerce::integral_key;
use crate::error::{Result, RuntimeError};
use crate::refid::{RefId, ScriptId};
use crate::value::{ScriptPrivateResource, Value};
use indexmap::{Equivalent, IndexMap};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A key in a table, classified by the index it routes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableKey {
    /// Positive integral number up to 2^53.
    Index(usize),
    Str(Arc<str>),
    /// Any other non-nil, non-NaN value.
    Generic(Value),
}

impl TableKey {
    /// Classify a key for writing. Nil and NaN keys are rejected.
    pub fn route(key: &Value) -> Result<TableKey> {
        match key {
            Value::Nil | Value::Void => Err(RuntimeError::TableIndexIsNil),
            Value::Number(n) if n.is_nan() => Err(RuntimeError::TableIndexIsNaN),
            Value::String(s) => Ok(TableKey::Str(s.clone())),
            Value::Number(n) => Ok(match integral_key(*n) {
                Some(i) => TableKey::Index(i),
                None => TableKey::Generic(key.clone()),
            }),
            other => Ok(TableKey::Generic(other.clone())),
        }
    }

    /// Classify a key for reading; `None` for keys that can never be stored.
    pub fn lookup(key: &Value) -> Option<TableKey> {
        Self::route(key).ok()
    }

    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Index(i) => Value::Number(*i as f64),
            TableKey::Str(s) => Value::String(s.clone()),
            TableKey::Generic(v) => v.clone(),
        }
    }
}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            TableKey::Index(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            TableKey::Str(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            TableKey::Generic(v) => {
                2u8.hash(state);
                v.hash(state);
            }
        }
    }
}

/// Borrowed string key, hashed exactly like [`TableKey::Str`].
struct StrKey<'a>(&'a str);

impl Hash for StrKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        1u8.hash(state);
        self.0.hash(state);
    }
}

impl Equivalent<TableKey> for StrKey<'_> {
    fn equivalent(&self, key: &TableKey) -> bool {
        matches!(key, TableKey::Str(s) if &**s == self.0)
    }
}

/// A key/value pair produced by traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct TablePair {
    pub key: Value,
    pub value: Value,
}

struct Table {
    entries: IndexMap<TableKey, Value>,
    /// Border cache; `None` means it must be recomputed.
    cached_length: Option<usize>,
    contains_nil_entries: bool,
    metatable: Option<TableRef>,
    owner: Option<ScriptId>,
    /// Last slot filled by constructor-style array initialization.
    init_array: usize,
    /// Bumped whenever existing entries change position.
    version: u64,
}

impl Table {
    fn new(owner: Option<ScriptId>) -> Self {
        Table {
            entries: IndexMap::new(),
            cached_length: Some(0),
            contains_nil_entries: false,
            metatable: None,
            owner,
            init_array: 0,
            version: 0,
        }
    }

    #[inline]
    fn is_live_index(&self, i: usize) -> bool {
        self.entries
            .get(&TableKey::Index(i))
            .is_some_and(Value::is_not_nil)
    }

    fn set(&mut self, key: TableKey, value: Value) {
        let index = match key {
            TableKey::Index(i) => Some(i),
            _ => None,
        };
        let value_is_nil = value.is_nil();
        let prev_was_nil = if value_is_nil {
            match self.entries.get_mut(&key) {
                Some(slot) => std::mem::replace(slot, Value::Nil).is_nil(),
                // Never stored: nothing to tombstone.
                None => return,
            }
        } else {
            self.entries.insert(key, value).map_or(true, |prev| prev.is_nil())
        };

        if value_is_nil {
            if !prev_was_nil {
                self.contains_nil_entries = true;
                if index.is_some() {
                    self.cached_length = None;
                }
            }
        } else if prev_was_nil {
            if self.contains_nil_entries {
                self.collect_dead_keys();
            } else if let Some(i) = index {
                self.cached_length = match self.cached_length {
                    Some(len) if len + 1 == i && !self.is_live_index(i + 1) => Some(i),
                    _ => None,
                };
            }
        }
    }

    fn remove<Q>(&mut self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<TableKey> + ?Sized,
    {
        match self.entries.shift_remove_full(key) {
            Some((_, k, _)) => {
                self.version += 1;
                if matches!(k, TableKey::Index(_)) {
                    self.cached_length = None;
                }
                true
            }
            None => false,
        }
    }

    fn length(&mut self) -> usize {
        if let Some(len) = self.cached_length {
            return len;
        }
        let mut n = 0;
        while self.is_live_index(n + 1) {
            n += 1;
        }
        self.cached_length = Some(n);
        n
    }

    fn collect_dead_keys(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, v| v.is_not_nil());
        let removed = before - self.entries.len();
        if removed > 0 {
            self.version += 1;
            trace!(removed, "collected dead table keys");
        }
        self.contains_nil_entries = false;
        self.cached_length = None;
    }

    /// First live entry at or after `start`, with its position.
    fn live_from(&self, start: usize) -> Option<(usize, TablePair)> {
        (start..self.entries.len()).find_map(|i| {
            let (k, v) = self.entries.get_index(i)?;
            v.is_not_nil().then(|| {
                (
                    i,
                    TablePair {
                        key: k.to_value(),
                        value: v.clone(),
                    },
                )
            })
        })
    }

    fn next(&self, key: &Value) -> Result<Option<TablePair>> {
        let start = if key.is_nil() {
            0
        } else {
            let k = TableKey::lookup(key).ok_or(RuntimeError::InvalidNextKey)?;
            self.entries
                .get_index_of(&k)
                .ok_or(RuntimeError::InvalidNextKey)?
                + 1
        };
        Ok(self.live_from(start).map(|(_, pair)| pair))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.cached_length = Some(0);
        self.contains_nil_entries = false;
        self.init_array = 0;
        self.version += 1;
    }
}

struct TableCell {
    id: RefId,
    state: RwLock<Option<Table>>,
}

/// Shared handle to a table. Cloning the handle aliases the same table.
///
/// A table either belongs to one script instance or is *prime* (owned by
/// none). Prime tables may only hold prime resources; owned tables may not
/// hold resources of another script.
#[derive(Clone)]
pub struct TableRef(Arc<TableCell>);

/// Non-owning handle, used by script registries.
#[derive(Clone)]
pub struct WeakTableRef(Weak<TableCell>);

impl WeakTableRef {
    pub fn upgrade(&self) -> Option<TableRef> {
        self.0.upgrade().map(TableRef)
    }
}

impl TableRef {
    pub fn new(owner: Option<ScriptId>) -> Self {
        let id = RefId::next();
        trace!(%id, ?owner, "table created");
        TableRef(Arc::new(TableCell {
            id,
            state: RwLock::new(Some(Table::new(owner))),
        }))
    }

    /// A table that belongs to no script.
    pub fn new_prime() -> Self {
        Self::new(None)
    }

    /// A table whose keys `1..=n` hold `values` in order.
    pub fn from_array(
        owner: Option<ScriptId>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let table = Self::new(owner);
        for (i, v) in values.into_iter().enumerate() {
            table.set_index(i + 1, v)?;
        }
        Ok(table)
    }

    pub fn from_pairs<K: Into<Value>>(
        owner: Option<ScriptId>,
        pairs: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<Self> {
        let table = Self::new(owner);
        for (k, v) in pairs {
            table.set(&k.into(), v)?;
        }
        Ok(table)
    }

    #[inline]
    pub fn id(&self) -> RefId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakTableRef {
        WeakTableRef(Arc::downgrade(&self.0))
    }

    pub fn is_alive(&self) -> bool {
        self.0.state.read().is_some()
    }

    fn read(&self, op: &str) -> Result<MappedRwLockReadGuard<'_, Table>> {
        RwLockReadGuard::try_map(self.0.state.read(), Option::as_ref)
            .map_err(|_| RuntimeError::dead("table", op))
    }

    fn write(&self, op: &str) -> Result<MappedRwLockWriteGuard<'_, Table>> {
        RwLockWriteGuard::try_map(self.0.state.write(), Option::as_mut)
            .map_err(|_| RuntimeError::dead("table", op))
    }

    pub fn owner(&self) -> Result<Option<ScriptId>> {
        Ok(self.read("query")?.owner)
    }

    pub fn is_prime(&self) -> Result<bool> {
        Ok(self.owner()?.is_none())
    }

    // ---- Ownership ----

    fn check_resource(owner: Option<ScriptId>, value: &Value) -> Result<()> {
        let Some(resource) = value.as_private_resource() else {
            return Ok(());
        };
        match (owner, resource.owner_script()) {
            (Some(mine), Some(theirs)) if mine != theirs => {
                Err(RuntimeError::InvalidOperation(format!(
                    "attempt to store a resource owned by {theirs} in a table owned by {mine}"
                )))
            }
            (None, Some(theirs)) => Err(RuntimeError::InvalidOperation(format!(
                "attempt to store a resource owned by {theirs} in a prime table"
            ))),
            _ => Ok(()),
        }
    }

    /// Must run before the write lock is taken: the value may be this table.
    fn check_ownership(&self, key: Option<&Value>, value: &Value) -> Result<()> {
        let owner = self.read("modify")?.owner;
        if let Some(key) = key {
            Self::check_resource(owner, key)?;
        }
        Self::check_resource(owner, value)
    }

    // ---- Reads ----

    /// The value stored under `key`; nil when absent.
    pub fn get(&self, key: &Value) -> Result<Value> {
        Ok(self.raw_get(key)?.unwrap_or(Value::NIL))
    }

    /// `None` when the key was never stored; `Some(Nil)` for a cleared key.
    pub fn raw_get(&self, key: &Value) -> Result<Option<Value>> {
        let table = self.read("index")?;
        Ok(TableKey::lookup(key).and_then(|k| table.entries.get(&k).cloned()))
    }

    pub fn get_str(&self, key: &str) -> Result<Value> {
        let table = self.read("index")?;
        Ok(table
            .entries
            .get(&StrKey(key))
            .cloned()
            .unwrap_or(Value::NIL))
    }

    pub fn get_index(&self, index: usize) -> Result<Value> {
        self.get(&Value::Number(index as f64))
    }

    /// The table stored under `key`, if the value there is a table.
    pub fn get_table(&self, key: &Value) -> Result<Option<TableRef>> {
        Ok(self.get(key)?.as_table().cloned())
    }

    // ---- Writes ----

    /// Assign `value` to `key`. Assigning nil clears the key.
    pub fn set(&self, key: &Value, value: Value) -> Result<()> {
        let route = TableKey::route(key)?;
        let key_value = matches!(route, TableKey::Generic(_)).then_some(key);
        self.check_ownership(key_value, &value)?;
        let value = if value.is_void() { Value::NIL } else { value };
        self.write("assign to")?.set(route, value);
        Ok(())
    }

    pub fn set_str(&self, key: &str, value: Value) -> Result<()> {
        self.set(&Value::new_string(key), value)
    }

    pub fn set_index(&self, index: usize, value: Value) -> Result<()> {
        self.set(&Value::Number(index as f64), value)
    }

    /// Store `value` at `length() + 1`.
    pub fn append(&self, value: Value) -> Result<()> {
        self.check_ownership(None, &value)?;
        let mut table = self.write("append to")?;
        let n = table.length() + 1;
        table.set(TableKey::Index(n), value);
        Ok(())
    }

    /// Physically remove `key`. Returns whether an entry was present.
    pub fn remove(&self, key: &Value) -> Result<bool> {
        let Some(route) = TableKey::lookup(key) else {
            return Ok(false);
        };
        Ok(self.write("remove from")?.remove(&route))
    }

    pub fn remove_str(&self, key: &str) -> Result<bool> {
        Ok(self.write("remove from")?.remove(&StrKey(key)))
    }

    pub fn remove_index(&self, index: usize) -> Result<bool> {
        self.remove(&Value::Number(index as f64))
    }

    /// Constructor-style array initialization: stores `value` in the next
    /// array slot. In the last position a tuple is spread over several slots.
    pub fn init_next_array_key(&self, value: Value, last_position: bool) -> Result<()> {
        if let (Value::Tuple(t), true) = (&value, last_position) {
            for v in t.iter() {
                self.init_next_array_key(v.clone(), true)?;
            }
            return Ok(());
        }
        let value = value.to_scalar();
        self.check_ownership(None, &value)?;
        let mut table = self.write("initialize")?;
        table.init_array += 1;
        let slot = table.init_array;
        table.set(TableKey::Index(slot), value);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.write("clear")?.clear();
        Ok(())
    }

    /// Remove every tombstone and reset the border cache.
    pub fn collect_dead_keys(&self) -> Result<()> {
        self.write("compact")?.collect_dead_keys();
        Ok(())
    }

    // ---- Length and traversal ----

    /// The border: the largest `n` such that keys `1..=n` all hold non-nil
    /// values and `n + 1` does not.
    pub fn length(&self) -> Result<usize> {
        Ok(self.write("get length of")?.length())
    }

    /// Number of physically stored entries, tombstones included.
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.read("count")?.entries.len())
    }

    /// The live entry after `key` in insertion order; nil starts the traversal.
    /// `Ok(None)` marks the end. A key that is not present is an error.
    pub fn next_key(&self, key: &Value) -> Result<Option<TablePair>> {
        self.read("traverse")?.next(key)
    }

    /// Lazy traversal of live entries in insertion order.
    ///
    /// Removing entries (or clearing the table) while a traversal is in
    /// flight invalidates it; the next step yields an error.
    pub fn pairs(&self) -> Result<Pairs> {
        let version = self.read("traverse")?.version;
        Ok(Pairs {
            table: self.clone(),
            position: 0,
            version,
            done: false,
        })
    }

    pub fn keys(&self) -> Result<impl Iterator<Item = Result<Value>>> {
        Ok(self.pairs()?.map(|r| r.map(|p| p.key)))
    }

    pub fn values(&self) -> Result<impl Iterator<Item = Result<Value>>> {
        Ok(self.pairs()?.map(|r| r.map(|p| p.value)))
    }

    // ---- Metatable ----

    pub fn metatable(&self) -> Result<Option<TableRef>> {
        Ok(self.read("query")?.metatable.clone())
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) -> Result<()> {
        if let Some(mt) = &metatable {
            self.check_ownership(None, &Value::Table(mt.clone()))?;
        }
        self.write("set metatable of")?.metatable = metatable;
        Ok(())
    }

    // ---- Paths ----

    fn resolve_path<'k>(&self, keys: &'k [Value]) -> Result<(TableRef, &'k Value)> {
        let (last, parents) = keys.split_last().ok_or(RuntimeError::TableIndexIsNil)?;
        let mut table = self.clone();
        for key in parents {
            table = match table.get(key)? {
                Value::Table(t) => t,
                Value::Nil | Value::Void => {
                    return Err(RuntimeError::KeyPath {
                        key: key.to_print_string(),
                        reason: "did not point to anything",
                    })
                }
                _ => {
                    return Err(RuntimeError::KeyPath {
                        key: key.to_print_string(),
                        reason: "did not point to a table",
                    })
                }
            };
        }
        Ok((table, last))
    }

    /// Follow `keys` through nested tables and read the final key.
    pub fn get_path(&self, keys: &[Value]) -> Result<Value> {
        let (table, key) = self.resolve_path(keys)?;
        table.get(key)
    }

    pub fn set_path(&self, keys: &[Value], value: Value) -> Result<()> {
        let (table, key) = self.resolve_path(keys)?;
        table.set(key, value)
    }

    pub fn remove_path(&self, keys: &[Value]) -> Result<bool> {
        let (table, key) = self.resolve_path(keys)?;
        table.remove(key)
    }

    // ---- Lifecycle ----

    /// Detach this table, and every table reachable through its values, from
    /// its owning script. Stops at tables that are already prime.
    pub fn make_prime(&self) -> Result<()> {
        let children: Vec<TableRef> = {
            let mut table = self.write("make prime")?;
            if table.owner.take().is_none() {
                return Ok(());
            }
            table
                .entries
                .values()
                .filter_map(|v| v.as_table().cloned())
                .collect()
        };
        debug!(id = %self.id(), children = children.len(), "table made prime");
        for child in children.iter().filter(|c| c.is_alive()) {
            child.make_prime()?;
        }
        Ok(())
    }

    /// Kill the table: its contents are released and every later operation
    /// fails. Returns false if it was already dead.
    pub fn kill(&self) -> bool {
        let contents = self.0.state.write().take();
        match contents {
            Some(table) => {
                debug!(id = %self.id(), entries = table.entries.len(), "table killed");
                drop(table);
                true
            }
            None => false,
        }
    }
}

impl ScriptPrivateResource for TableRef {
    fn owner_script(&self) -> Option<ScriptId> {
        self.0.state.read().as_ref().and_then(|t| t.owner)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table({})", self.id())
    }
}

/// Iterator over the live entries of a table. See [`TableRef::pairs`].
pub struct Pairs {
    table: TableRef,
    position: usize,
    version: u64,
    done: bool,
}

impl Iterator for Pairs {
    type Item = Result<TablePair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let guard = self.table.0.state.read();
        let Some(table) = guard.as_ref() else {
            self.done = true;
            return Some(Err(RuntimeError::dead("table", "traverse")));
        };
        if table.version != self.version {
            self.done = true;
            return Some(Err(RuntimeError::InvalidOperation(
                "table was structurally modified during traversal".into(),
            )));
        }
        match table.live_from(self.position) {
            Some((i, pair)) => {
                self.position = i + 1;
                Some(Ok(pair))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}
