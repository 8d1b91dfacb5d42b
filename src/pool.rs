//! Fixed-capacity message pool and the queue lists threaded through it.
//!
//! Slots live in one arena sized at build time; queue membership is a pair
//! of neighbor indices plus a tag stored alongside each slot, so messages
//! move between the ready/wait/timer lists without any allocation. A slot is
//! free exactly when it holds no message, and an occupied slot is on at most
//! one list.

use crate::message::{Message, Role};

/// Number of message slots. The ninth concurrent message is refused.
pub const POOL_LEN: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QueueId {
    Ready,
    Wait,
    Timer,
}

#[derive(Default)]
pub struct Slot {
    pub msg: Option<Message>,
    /// How many times the send hook has been handed this message.
    pub attempts: u32,
    /// Response deadline, retry back-off, or deferred-release time,
    /// depending on the list the slot is on.
    pub expiry: u64,
    queue: Option<QueueId>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Slot {
    pub fn role(&self) -> Role {
        self.msg.as_ref().map(|m| m.role).unwrap_or(Role::None)
    }
}

/// Head/tail/length of one queue. The engine owns three of these.
#[derive(Clone, Copy)]
pub struct List {
    id: QueueId,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl List {
    pub fn new(id: QueueId) -> Self {
        List {
            id,
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<usize> {
        self.head
    }
}

pub struct Pool {
    slots: Vec<Slot>,
}

impl Pool {
    pub fn new() -> Self {
        Pool {
            slots: (0..POOL_LEN).map(|_| Slot::default()).collect(),
        }
    }

    /// Claims a free slot for `msg`. Returns the slot index, or `None` when
    /// all slots are occupied.
    pub fn alloc(&mut self, msg: Message) -> Option<usize> {
        let index = self.slots.iter().position(|s| s.msg.is_none())?;
        let slot = &mut self.slots[index];
        debug_assert!(slot.queue.is_none());
        slot.msg = Some(msg);
        slot.attempts = 0;
        slot.expiry = 0;
        Some(index)
    }

    /// Returns the slot to the free state. The slot must not be on a list.
    pub fn free(&mut self, index: usize) {
        debug_assert!(self.slots[index].queue.is_none());
        self.slots[index] = Slot::default();
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.slots[index]
    }

    pub fn msg(&self, index: usize) -> &Message {
        self.slots[index].msg.as_ref().expect("occupied slot")
    }

    pub fn push_front(&mut self, list: &mut List, index: usize) {
        self.attach(list, index);
        let slot = &mut self.slots[index];
        slot.prev = None;
        slot.next = list.head;
        if let Some(old) = list.head {
            self.slots[old].prev = Some(index);
        } else {
            list.tail = Some(index);
        }
        list.head = Some(index);
        list.len += 1;
    }

    pub fn push_back(&mut self, list: &mut List, index: usize) {
        self.attach(list, index);
        let slot = &mut self.slots[index];
        slot.next = None;
        slot.prev = list.tail;
        if let Some(old) = list.tail {
            self.slots[old].next = Some(index);
        } else {
            list.head = Some(index);
        }
        list.tail = Some(index);
        list.len += 1;
    }

    /// Unlinks a slot from the list it is on. The slot stays occupied.
    pub fn remove(&mut self, list: &mut List, index: usize) {
        debug_assert_eq!(self.slots[index].queue, Some(list.id));
        let (prev, next) = (self.slots[index].prev, self.slots[index].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => list.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => list.tail = prev,
        }
        let slot = &mut self.slots[index];
        slot.queue = None;
        slot.prev = None;
        slot.next = None;
        list.len -= 1;
    }

    /// Slot indices in list order, snapshotted so the caller may remove
    /// entries while walking.
    pub fn indices(&self, list: &List) -> Vec<usize> {
        let mut out = Vec::with_capacity(list.len);
        let mut at = list.head;
        while let Some(index) = at {
            out.push(index);
            at = self.slots[index].next;
        }
        out
    }

    pub fn find_by_id(&self, list: &List, id: &str) -> Option<usize> {
        self.indices(list)
            .into_iter()
            .find(|&i| self.msg(i).id == id)
    }

    fn attach(&mut self, list: &List, index: usize) {
        let slot = &mut self.slots[index];
        debug_assert!(slot.msg.is_some());
        debug_assert!(slot.queue.is_none(), "slot already on a list");
        slot.queue = Some(list.id);
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}
