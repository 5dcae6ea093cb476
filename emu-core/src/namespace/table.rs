use std::fmt;

/// Stable handle to a client in a [`ClientTable`]. A handle outlives its client: once the
/// slot is reused the generation no longer matches and lookups miss.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId {
    index: u32,
    generation: u32,
}

impl ClientId {
    pub fn new(index: u32, generation: u32) -> Self {
        ClientId { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Entry<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Arena of clients. Membership links are slot indexes, so iteration follows insertion order
/// and removal is O(1) without the members pointing at each other.
pub struct ClientTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> ClientTable<T> {
    pub fn new() -> Self {
        ClientTable {
            slots: Vec::new(),
            free: Vec::new(),
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

    /// Appends `value` at the end of the iteration order.
    pub fn insert(&mut self, value: T) -> ClientId {
        let entry = Entry {
            value,
            prev: self.tail,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        match self.tail {
            Some(tail) => self.link_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        ClientId::new(index, self.slots[index as usize].generation)
    }

    pub fn remove(&mut self, id: ClientId) -> Option<T> {
        self.get(id)?;
        let slot = &mut self.slots[id.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        match entry.prev {
            Some(prev) => self.link_mut(prev).next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.link_mut(next).prev = entry.prev,
            None => self.tail = entry.prev,
        }
        self.free.push(id.index);
        self.len -= 1;
        Some(entry.value)
    }

    pub fn get(&self, id: ClientId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.entry.as_ref().map(|e| &e.value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.entry.as_mut().map(|e| &mut e.value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.get(id).is_some()
    }

    /// Members in insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            table: self,
            cursor: self.head,
        }
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.iter().map(|(id, _)| id).collect()
    }

    fn link_mut(&mut self, index: u32) -> &mut Entry<T> {
        match self.slots[index as usize].entry.as_mut() {
            Some(entry) => entry,
            None => unreachable!("linked slot {} is empty", index),
        }
    }
}

impl<T> Default for ClientTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    table: &'a ClientTable<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (ClientId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.table.slots[index as usize];
        let entry = slot.entry.as_ref()?;
        self.cursor = entry.next;
        Some((ClientId::new(index, slot.generation), &entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(table: &ClientTable<&'static str>) -> Vec<&'static str> {
        table.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn insertion_order() {
        let mut table = ClientTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        let c = table.insert("c");
        assert_eq!(values(&table), vec!["a", "b", "c"]);
        assert_eq!(table.ids(), vec![a, b, c]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn remove_head_middle_tail() {
        let mut table = ClientTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        let c = table.insert("c");
        let d = table.insert("d");

        assert_eq!(table.remove(b), Some("b"));
        assert_eq!(values(&table), vec!["a", "c", "d"]);
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(values(&table), vec!["c", "d"]);
        assert_eq!(table.remove(d), Some("d"));
        assert_eq!(values(&table), vec!["c"]);
        assert_eq!(table.remove(c), Some("c"));
        assert!(table.is_empty());
        assert_eq!(table.iter().count(), 0);
    }

    #[test]
    fn stale_handle_misses() {
        let mut table = ClientTable::new();
        let a = table.insert("a");
        table.remove(a);
        let b = table.insert("b");

        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(table.get(a), None);
        assert_eq!(table.remove(a), None);
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(values(&table), vec!["b"]);
    }

    #[test]
    fn reused_slot_goes_to_the_back() {
        let mut table = ClientTable::new();
        let a = table.insert("a");
        table.insert("b");
        table.remove(a);
        table.insert("c");
        assert_eq!(values(&table), vec!["b", "c"]);
        let first = table.ids()[0];
        *table.get_mut(first).unwrap() = "B";
        assert_eq!(values(&table), vec!["B", "c"]);
    }
}
