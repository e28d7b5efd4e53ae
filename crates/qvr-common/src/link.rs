// link.rs -- index-linked circular lists
//
// Every list head and every member node lives in one `LinkArena` and is
// addressed by a `LinkId`. A cleared node points at itself, which is also
// what an empty list head looks like.

/// Handle to a node in a `LinkArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

#[derive(Debug, Clone)]
struct Link<T> {
    prev: usize,
    next: usize,
    value: Option<T>,
}

/// Arena of doubly linked list nodes. Heads carry no value.
#[derive(Debug, Clone)]
pub struct LinkArena<T> {
    links: Vec<Link<T>>,
}

impl<T> Default for LinkArena<T> {
    fn default() -> Self {
        Self { links: Vec::new() }
    }
}

impl<T: Copy> LinkArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, value: Option<T>) -> LinkId {
        let id = self.links.len();
        self.links.push(Link { prev: id, next: id, value });
        LinkId(id)
    }

    /// Allocate an empty list head.
    pub fn alloc_head(&mut self) -> LinkId {
        self.push(None)
    }

    /// Allocate a cleared node carrying `value`.
    pub fn alloc(&mut self, value: T) -> LinkId {
        self.push(Some(value))
    }

    /// Point a node at itself.
    pub fn clear(&mut self, l: LinkId) {
        let link = &mut self.links[l.0];
        link.prev = l.0;
        link.next = l.0;
    }

    /// True when the node is a member of some list (or a non-empty head).
    pub fn is_linked(&self, l: LinkId) -> bool {
        self.links[l.0].next != l.0
    }

    /// Unlink a node from its list and clear it. No-op when not linked.
    pub fn remove(&mut self, l: LinkId) {
        let Link { prev, next, .. } = self.links[l.0];
        if next == l.0 {
            return;
        }
        self.links[next].prev = prev;
        self.links[prev].next = next;
        self.clear(l);
    }

    /// Insert `l` in front of `before`. Inserting in front of a head appends
    /// to the tail of that list. `l` is removed from any list it was in.
    pub fn insert_before(&mut self, l: LinkId, before: LinkId) {
        self.remove(l);
        let prev = self.links[before.0].prev;
        self.links[l.0].next = before.0;
        self.links[l.0].prev = prev;
        self.links[prev].next = l.0;
        self.links[before.0].prev = l.0;
    }

    /// Walk the values of a list from head to tail.
    pub fn iter(&self, head: LinkId) -> LinkIter<'_, T> {
        LinkIter {
            arena: self,
            head: head.0,
            cur: self.links[head.0].next,
        }
    }
}

pub struct LinkIter<'a, T> {
    arena: &'a LinkArena<T>,
    head: usize,
    cur: usize,
}

impl<T: Copy> Iterator for LinkIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.cur != self.head {
            let link = &self.arena.links[self.cur];
            self.cur = link.next;
            if link.value.is_some() {
                return link.value;
            }
        }
        None
    }
}
