// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Size-bounded slot arena with generation-checked handles.
//!
//! A freed slot bumps its generation, so a handle kept past `remove` never
//! resolves to whatever reuses the slot.

use core::fmt;

use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

impl Handle {
    /// Pack into the correlation token handed to the transport.
    #[inline]
    pub fn to_token(self) -> u64 {
        ((self.index as u64) << 32) | self.generation as u64
    }

    #[inline]
    pub fn from_token(token: u64) -> Self {
        Self {
            index: (token >> 32) as u32,
            generation: token as u32,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
    len: usize,
}

impl<T> Arena<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            len: 0,
        }
    }

    /// Store `value`; hands it back when every slot is taken.
    pub fn insert(&mut self, value: T) -> Result<Handle, T> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                // free list only holds vacant slots
                Slot::Occupied { .. } => return Err(value),
            };
            *slot = Slot::Occupied { generation, value };
            self.len += 1;
            return Ok(Handle { index, generation });
        }
        if self.slots.len() >= self.capacity {
            return Err(value);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        self.len += 1;
        Ok(Handle {
            index,
            generation: 0,
        })
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        match self.slots.get(h.index as usize)? {
            Slot::Occupied { generation, value } if *generation == h.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        match self.slots.get_mut(h.index as usize)? {
            Slot::Occupied { generation, value } if *generation == h.generation => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, h: Handle) -> Option<T> {
        let slot = self.slots.get_mut(h.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == h.generation => {},
            _ => return None,
        }
        let next = Slot::Vacant {
            generation: h.generation.wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, next) else {
            return None;
        };
        self.free.push(h.index);
        self.len -= 1;
        Some(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_is_rejected_after_reuse() {
        let mut a = Arena::with_capacity(1);
        let h1 = a.insert("first").expect("slot");
        assert_eq!(a.remove(h1), Some("first"));
        let h2 = a.insert("second").expect("slot");
        assert_eq!(h1.index, h2.index);
        assert_ne!(h1.generation, h2.generation);
        assert!(a.get(h1).is_none());
        assert_eq!(a.get(h2), Some(&"second"));
        assert_eq!(a.remove(h1), None);
    }

    #[test]
    fn full_arena_returns_value() {
        let mut a = Arena::with_capacity(1);
        let _h = a.insert(1u8).expect("slot");
        assert_eq!(a.insert(2u8), Err(2u8));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn token_round_trip() {
        let h = Handle {
            index: 7,
            generation: 3,
        };
        assert_eq!(Handle::from_token(h.to_token()), h);
    }
}
