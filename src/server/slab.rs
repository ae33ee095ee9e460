use mio::Token;

use crate::server::connection::Connection;

/// Stable address of a connection slot. The generation changes every time
/// the slot is freed, so keys held by stale events or late completions no
/// longer match once the slot serves a different socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub index: u32,
    pub generation: u32,
}

impl SlotKey {
    pub fn token(self) -> Token {
        Token((((self.generation as u64) << 32) | self.index as u64) as usize)
    }

    pub fn from_token(token: Token) -> Self {
        let raw = token.0 as u64;
        Self {
            index: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

pub struct Slot {
    generation: u32,
    occupied: bool,
    next_free: Option<u32>,
    // `None` while the connection is lent to a worker, or before first use.
    conn: Option<Box<Connection>>,
    lent: bool,
    pending_read: bool,
    close_requested: bool,
}

impl Slot {
    fn vacant(next_free: Option<u32>) -> Self {
        Self {
            generation: 0,
            occupied: false,
            next_free,
            conn: None,
            lent: false,
            pending_read: false,
            close_requested: false,
        }
    }

    pub fn is_lent(&self) -> bool {
        self.lent
    }

    /// Remembers readiness that arrived while a worker held the connection.
    pub fn mark_pending_read(&mut self) {
        self.pending_read = true;
    }

    pub fn take_pending_read(&mut self) -> bool {
        std::mem::take(&mut self.pending_read)
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn conn_mut(&mut self) -> Option<&mut Connection> {
        self.conn.as_deref_mut()
    }
}

/// Fixed-capacity arena of connection slots with an intrusive free list.
/// Connections are created on first use of a slot and then kept, buffers
/// included, for every later socket that lands in the same slot.
pub struct ConnectionSlab {
    slots: Box<[Slot]>,
    head_free: Option<u32>,
    active: usize,
    read_capacity: usize,
    write_capacity: usize,
}

impl ConnectionSlab {
    pub fn new(capacity: usize, read_capacity: usize, write_capacity: usize) -> Self {
        let slots: Vec<Slot> = (0..capacity)
            .map(|i| Slot::vacant(if i + 1 < capacity { Some((i + 1) as u32) } else { None }))
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            head_free: if capacity > 0 { Some(0) } else { None },
            active: 0,
            read_capacity,
            write_capacity,
        }
    }

    /// O(1): claims a free slot, or `None` when every slot is taken.
    pub fn allocate(&mut self) -> Option<SlotKey> {
        let index = self.head_free?;
        let (read_capacity, write_capacity) = (self.read_capacity, self.write_capacity);
        let slot = &mut self.slots[index as usize];

        self.head_free = slot.next_free.take();
        slot.occupied = true;
        slot.lent = false;
        slot.pending_read = false;
        slot.close_requested = false;
        if slot.conn.is_none() {
            slot.conn = Some(Box::new(Connection::new(read_capacity, write_capacity)));
        }

        self.active += 1;
        Some(SlotKey { index, generation: slot.generation })
    }

    /// Returns the slot to the free list and invalidates `key`. Lent slots
    /// cannot be freed; the caller must wait for the connection to return.
    pub fn free(&mut self, key: SlotKey) -> bool {
        let head = self.head_free;
        let Some(slot) = self.get_mut(key) else {
            return false;
        };
        if slot.lent {
            return false;
        }

        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.next_free = head;
        self.head_free = Some(key.index);
        self.active -= 1;
        true
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut Slot> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.occupied && slot.generation == key.generation)
    }

    /// The connection in `key`'s slot, unless a worker holds it.
    pub fn conn_mut(&mut self, key: SlotKey) -> Option<&mut Connection> {
        self.get_mut(key)?.conn_mut()
    }

    /// Moves the connection out for exclusive use by a worker.
    pub fn lend(&mut self, key: SlotKey) -> Option<Box<Connection>> {
        let slot = self.get_mut(key)?;
        let conn = slot.conn.take()?;
        slot.lent = true;
        Some(conn)
    }

    /// Puts a lent connection back. Hands it back to the caller when `key`
    /// no longer names the slot it came from.
    pub fn restore(&mut self, key: SlotKey, conn: Box<Connection>) -> Result<&mut Slot, Box<Connection>> {
        match self.get_mut(key) {
            Some(slot) if slot.lent => {
                slot.lent = false;
                slot.conn = Some(conn);
                Ok(slot)
            }
            _ => Err(conn),
        }
    }

    /// Keys of all occupied slots.
    pub fn keys(&self) -> Vec<SlotKey> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.occupied)
            .map(|(i, slot)| SlotKey { index: i as u32, generation: slot.generation })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
