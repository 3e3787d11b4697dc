//! Insertion-ordered arena with stable handles

/// Handle to an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    #[must_use]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Arena of entries.
///
/// Removed slots become tombstones and are never reused, so iteration keeps
/// insertion order and a stale handle can never alias a newer entry.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, value: T) -> Handle {
        let handle = Handle(self.slots.len() as u32);
        self.slots.push(Some(value));
        self.live += 1;
        handle
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let value = self.slots.get_mut(handle.index())?.take()?;
        self.live -= 1;
        Some(value)
    }

    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    /// Live entries in insertion order
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (Handle(i as u32), v)))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
