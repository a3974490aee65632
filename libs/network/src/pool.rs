//! Fixed-capacity connection slot arena
//!
//! All connections and their buffers are allocated when the pool is built.
//! Slots are threaded onto two intrusive index lists: a singly linked free
//! list and a doubly linked active list kept in acquisition order, so both
//! acquire and release are O(1) and nothing allocates afterwards.
//!
//! Ids carry the slot's generation. Releasing a slot bumps it, so an id kept
//! past the release no longer resolves.

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use rrlite_codec::{ProtocolError, ProtocolResult};
use rrlite_config::{PoolConfig, MIN_BUFFER_SIZE};
use std::fmt;
use tracing::debug;

/// Generation-tagged slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl ConnectionId {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    active: bool,
    prev: Option<usize>,
    /// Next active slot, or next free slot while on the free list
    next: Option<usize>,
    connection: Connection,
}

#[derive(Debug)]
pub struct ConnectionPool {
    slots: Box<[Slot]>,
    free_head: Option<usize>,
    active_head: Option<usize>,
    active_tail: Option<usize>,
    active_len: usize,
}

impl ConnectionPool {
    pub fn new(capacity: usize, buffer_size: usize) -> Result<Self> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(TransportError::configuration(
                "connection pool capacity must be between 1 and 2^32 - 1",
            ));
        }
        if buffer_size < MIN_BUFFER_SIZE {
            return Err(TransportError::configuration(format!(
                "connection buffer size {buffer_size} below minimum {MIN_BUFFER_SIZE}"
            )));
        }

        let slots: Box<[Slot]> = (0..capacity)
            .map(|i| Slot {
                generation: 0,
                active: false,
                prev: None,
                next: if i + 1 < capacity { Some(i + 1) } else { None },
                connection: Connection::new(buffer_size),
            })
            .collect();

        debug!(capacity, buffer_size, "connection pool allocated");
        Ok(Self {
            slots,
            free_head: Some(0),
            active_head: None,
            active_tail: None,
            active_len: 0,
        })
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::new(config.max_connections, config.buffer_size)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.active_len
    }

    pub fn is_empty(&self) -> bool {
        self.active_len == 0
    }

    pub fn is_full(&self) -> bool {
        self.free_head.is_none()
    }

    /// Take a free slot and append it to the active list
    ///
    /// The connection comes back reset to `Idle`. `None` when every slot is in use.
    pub fn acquire(&mut self) -> Option<ConnectionId> {
        let index = self.free_head?;
        self.free_head = self.slots[index].next;

        let tail = self.active_tail;
        {
            let slot = &mut self.slots[index];
            slot.active = true;
            slot.prev = tail;
            slot.next = None;
            slot.connection.reset();
        }
        match tail {
            Some(t) => self.slots[t].next = Some(index),
            None => self.active_head = Some(index),
        }
        self.active_tail = Some(index);
        self.active_len += 1;

        Some(self.id_at(index))
    }

    /// Unlink the slot, reset its connection and return it to the free list
    pub fn release(&mut self, id: ConnectionId) -> ProtocolResult<()> {
        let index = self.resolve(id)?;
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.active_head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.active_tail = prev,
        }

        let slot = &mut self.slots[index];
        slot.active = false;
        slot.prev = None;
        slot.next = self.free_head;
        slot.generation = slot.generation.wrapping_add(1);
        slot.connection.reset();
        self.free_head = Some(index);
        self.active_len -= 1;

        debug!(connection = %id, "connection slot released");
        Ok(())
    }

    fn id_at(&self, index: usize) -> ConnectionId {
        ConnectionId {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    fn resolve(&self, id: ConnectionId) -> ProtocolResult<usize> {
        match self.slots.get(id.index()) {
            Some(slot) if slot.active && slot.generation == id.generation => Ok(id.index()),
            _ => Err(ProtocolError::invalid_argument("stale or unknown connection id")),
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.resolve(id).is_ok()
    }

    pub fn get(&self, id: ConnectionId) -> ProtocolResult<&Connection> {
        let index = self.resolve(id)?;
        Ok(&self.slots[index].connection)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> ProtocolResult<&mut Connection> {
        let index = self.resolve(id)?;
        Ok(&mut self.slots[index].connection)
    }

    /// Id of the active connection in slot `index`
    pub fn id_for_index(&self, index: usize) -> Option<ConnectionId> {
        self.slots
            .get(index)
            .filter(|slot| slot.active)
            .map(|_| self.id_at(index))
    }

    pub fn first_active(&self) -> Option<ConnectionId> {
        self.active_head.map(|index| self.id_at(index))
    }

    /// Active connection after `id` in acquisition order
    pub fn next_active(&self, id: ConnectionId) -> Option<ConnectionId> {
        let index = self.resolve(id).ok()?;
        self.slots[index].next.map(|next| self.id_at(next))
    }

    /// Active ids in acquisition order
    pub fn active_ids(&self) -> ActiveIds<'_> {
        ActiveIds {
            pool: self,
            cursor: self.active_head,
        }
    }
}

pub struct ActiveIds<'p> {
    pool: &'p ConnectionPool,
    cursor: Option<usize>,
}

impl Iterator for ActiveIds<'_> {
    type Item = ConnectionId;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        self.cursor = self.pool.slots[index].next;
        Some(self.pool.id_at(index))
    }
}
