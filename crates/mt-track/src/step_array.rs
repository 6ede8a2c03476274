//! Frame-indexed storage of a track's steps

use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::step::Step;

/// Initial length of a new array
pub const DEFAULT_LENGTH: usize = 5;

/// Default growth increment
pub const DEFAULT_INCREMENT: usize = 5;

type Slots = Vec<Option<Arc<Step>>>;

/// Steps indexed by frame number.
///
/// In explicit mode slots may be empty. In autofill mode every slot always
/// holds a step: new slots are filled with copies of the last step before
/// them, and writing `None` is ignored.
///
/// Resizing builds the new slot vector under an upgradable read lock and
/// swaps it in under the write lock, so a reader on another thread sees
/// either the old or the new array, never a partial one.
#[derive(Debug)]
pub struct StepArray {
    slots: RwLock<Slots>,
    increment: usize,
    autofill: bool,
}

impl StepArray {
    /// Explicit-mode array with the default length and increment
    pub fn new() -> Self {
        Self::with_increment(DEFAULT_INCREMENT)
    }

    /// Explicit-mode array growing by `increment`
    pub fn with_increment(increment: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; DEFAULT_LENGTH]),
            increment: increment.max(1),
            autofill: false,
        }
    }

    /// Autofill-mode array whose every slot starts as a copy of `template`
    pub fn autofill(template: Step, increment: usize) -> Self {
        let mut slots: Slots = vec![None; DEFAULT_LENGTH];
        slots[0] = Some(Arc::new(template.with_frame(0)));
        fill(&mut slots);
        Self {
            slots: RwLock::new(slots),
            increment: increment.max(1),
            autofill: true,
        }
    }

    pub fn is_autofill(&self) -> bool {
        self.autofill
    }

    pub fn increment(&self) -> usize {
        self.increment
    }

    /// Current array length
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Step at frame `n`, growing the array first if `n` is past its end
    pub fn get_step(&self, n: usize) -> Option<Arc<Step>> {
        self.grow_to_include(n);
        self.slots.read().get(n).cloned().flatten()
    }

    /// Place a step at frame `n` and return the stored entry.
    ///
    /// The placed step's frame is fixed to `n`. In autofill mode `None` is
    /// ignored and the existing step is kept.
    pub fn set_step(&self, n: usize, step: Option<Step>) -> Option<Arc<Step>> {
        self.grow_to_include(n);
        if step.is_none() && self.autofill {
            return self.slots.read().get(n).cloned().flatten();
        }
        let entry = step.map(|s| Arc::new(s.with_frame(n)));
        let mut slots = self.slots.write();
        slots[n] = entry.clone();
        entry
    }

    /// Resize to `len` slots. Entries below the new length survive; new
    /// autofill slots are filled from the last step before them. An autofill
    /// array never shrinks below one slot.
    pub fn set_length(&self, len: usize) {
        let guard = self.slots.upgradable_read();
        self.resize(guard, len);
    }

    /// Empty every slot of an explicit-mode array. Autofill arrays are left
    /// unchanged.
    pub fn clear(&self) {
        if self.autofill {
            return;
        }
        let mut slots = self.slots.write();
        slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// True if this exact step object is stored
    pub fn contains(&self, step: &Arc<Step>) -> bool {
        self.slots
            .read()
            .iter()
            .flatten()
            .any(|s| Arc::ptr_eq(s, step))
    }

    /// True if no slot holds a step
    pub fn is_empty(&self) -> bool {
        self.slots.read().iter().all(Option::is_none)
    }

    /// True if any frame before `n` holds a step
    pub fn is_preceded(&self, n: usize) -> bool {
        let slots = self.slots.read();
        let end = n.min(slots.len());
        slots[..end].iter().any(Option::is_some)
    }

    /// Consistent copy of every slot
    pub fn snapshot(&self) -> Vec<Option<Arc<Step>>> {
        self.slots.read().clone()
    }

    /// Stored steps in frame order
    pub fn steps(&self) -> Vec<Arc<Step>> {
        self.slots.read().iter().flatten().cloned().collect()
    }

    fn grow_to_include(&self, n: usize) {
        let guard = self.slots.upgradable_read();
        let len = guard.len();
        if n < len {
            return;
        }
        let new_len = (n + self.increment).max(n + 1 - len);
        self.resize(guard, new_len);
    }

    fn resize(&self, guard: RwLockUpgradableReadGuard<'_, Slots>, len: usize) {
        let len = if self.autofill { len.max(1) } else { len };
        if len == guard.len() {
            return;
        }
        let mut next: Slots = guard.iter().take(len).cloned().collect();
        next.resize(len, None);
        if self.autofill {
            fill(&mut next);
        }
        let mut slots = RwLockUpgradableReadGuard::upgrade(guard);
        *slots = next;
    }
}

impl Default for StepArray {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace every empty slot with a copy of the last step before it
fn fill(slots: &mut [Option<Arc<Step>>]) {
    let mut last: Option<Arc<Step>> = None;
    for (n, slot) in slots.iter_mut().enumerate() {
        match slot {
            Some(step) => last = Some(Arc::clone(step)),
            None => {
                if let Some(template) = &last {
                    *slot = Some(Arc::new(template.with_frame(n)));
                }
            }
        }
    }
}
