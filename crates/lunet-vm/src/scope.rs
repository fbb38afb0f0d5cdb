//! Per-frame local variable storage.

use lunet_core::upvalue::UpvalueCell;
use lunet_core::value::Value;
use smallvec::SmallVec;

/// One local variable slot.
#[derive(Clone, Debug, Default)]
pub enum LocalSlot {
    /// Not declared yet, or reassigned since.
    #[default]
    Vacant,
    /// Plain value, not captured by any closure.
    Inline(Value),
    /// Captured: reads and writes go through the shared cell.
    Captured(UpvalueCell),
}

/// The locals of one script frame.
///
/// A local stays inline until a closure captures it; capturing moves it into
/// an [`UpvalueCell`] shared with the closure. [`LocalScope::reassign`] gives
/// the slot a fresh identity, so closures created in earlier loop iterations
/// keep their own cell.
#[derive(Clone, Debug, Default)]
pub struct LocalScope {
    slots: SmallVec<[LocalSlot; 8]>,
}

impl LocalScope {
    pub fn new(size: usize) -> Self {
        LocalScope {
            slots: SmallVec::from_elem(LocalSlot::Vacant, size),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether slot `index` holds a declared variable.
    pub fn is_valid(&self, index: usize) -> bool {
        matches!(
            self.slots.get(index),
            Some(LocalSlot::Inline(_) | LocalSlot::Captured(_))
        )
    }

    /// Value of slot `index`; nil for a vacant slot. `None` if out of range.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.slots.get(index).map(|slot| match slot {
            LocalSlot::Vacant => Value::NIL,
            LocalSlot::Inline(v) => v.clone(),
            LocalSlot::Captured(cell) => cell.get(),
        })
    }

    /// Store into slot `index`. Returns false if out of range.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.slots.get_mut(index) {
            Some(LocalSlot::Captured(cell)) => {
                cell.set(value);
                true
            }
            Some(slot) => {
                *slot = LocalSlot::Inline(value);
                true
            }
            None => false,
        }
    }

    /// The cell backing slot `index`, creating it on first capture.
    pub fn capture(&mut self, index: usize) -> Option<UpvalueCell> {
        let slot = self.slots.get_mut(index)?;
        if let LocalSlot::Captured(cell) = slot {
            return Some(cell.clone());
        }
        let value = match std::mem::take(slot) {
            LocalSlot::Inline(v) => v,
            _ => Value::NIL,
        };
        let cell = UpvalueCell::new(value);
        *slot = LocalSlot::Captured(cell.clone());
        Some(cell)
    }

    /// Detach slot `index` from any cell it shares and mark it vacant.
    pub fn reassign(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = LocalSlot::Vacant;
        }
    }

    /// Reassign every slot in `from..=to`.
    pub fn reassign_range(&mut self, from: usize, to: usize) {
        for i in from..=to.min(self.slots.len().saturating_sub(1)) {
            self.reassign(i);
        }
    }

    /// Drop every slot; captured cells stay alive as long as closures hold them.
    pub fn release(&mut self) {
        self.slots.clear();
    }
}
