//! Thread-safe doubly-linked container of opaque documents.
//!
//! Unlike the tree, which locks per node, the list synchronizes at container
//! granularity: one read-write lock guards the whole structure. Lookups and
//! size queries share the read lock; every mutation, including the in-place
//! `update_first`, holds the write lock for the full operation. Documents
//! are found by caller-supplied predicates; the container never inspects
//! them itself.
//!
//! Nodes live in id-addressed slots with a free list, the same ownership
//! discipline the tree uses: `prev`/`next` are ids, never owning pointers.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use parking_lot::RwLock;

use crate::codec::{encode_to_vec, Codec};
use crate::dump::{shift_add_checksum, Cursor, LIST_MAGIC, LIST_VERSION};
use crate::error::{TreeError, TreeResult};
use crate::types::{NodeId, NULL_NODE};

#[derive(Debug)]
struct DocNode<T> {
    doc: T,
    prev: NodeId,
    next: NodeId,
}

#[derive(Debug)]
struct ListCore<T> {
    slots: Vec<Option<DocNode<T>>>,
    free_list: Vec<usize>,
    head: NodeId,
    tail: NodeId,
    len: usize,
}

impl<T> ListCore<T> {
    fn alloc(&mut self, node: DocNode<T>) -> TreeResult<NodeId> {
        match self.free_list.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                Ok(index as NodeId)
            }
            None => {
                let index = self.slots.len();
                if index >= NULL_NODE as usize {
                    return Err(TreeError::ArenaExhausted);
                }
                self.slots.push(Some(node));
                Ok(index as NodeId)
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&DocNode<T>> {
        self.slots.get(id as usize)?.as_ref()
    }

    fn push_front(&mut self, doc: T) -> TreeResult<()> {
        let old_head = self.head;
        let id = self.alloc(DocNode {
            doc,
            prev: NULL_NODE,
            next: old_head,
        })?;
        match self.slots.get_mut(old_head as usize).and_then(|s| s.as_mut()) {
            Some(head_node) => head_node.prev = id,
            None => self.tail = id,
        }
        self.head = id;
        self.len += 1;
        Ok(())
    }

    fn push_back(&mut self, doc: T) -> TreeResult<()> {
        let old_tail = self.tail;
        let id = self.alloc(DocNode {
            doc,
            prev: old_tail,
            next: NULL_NODE,
        })?;
        match self.slots.get_mut(old_tail as usize).and_then(|s| s.as_mut()) {
            Some(tail_node) => tail_node.next = id,
            None => self.head = id,
        }
        self.tail = id;
        self.len += 1;
        Ok(())
    }

    /// Detach a node, repairing its neighbors' links, and hand back the doc.
    fn unlink(&mut self, id: NodeId) -> Option<T> {
        let node = self.slots.get_mut(id as usize)?.take()?;
        self.free_list.push(id as usize);

        match self.slots.get_mut(node.prev as usize).and_then(|s| s.as_mut()) {
            Some(prev_node) => prev_node.next = node.next,
            None => self.head = node.next,
        }
        match self.slots.get_mut(node.next as usize).and_then(|s| s.as_mut()) {
            Some(next_node) => next_node.prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.doc)
    }

    /// Id of the first document matching the predicate, from the head.
    fn find_id(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<NodeId> {
        let mut cursor = self.head;
        while cursor != NULL_NODE {
            let node = self.node(cursor)?;
            if predicate(&node.doc) {
                return Some(cursor);
            }
            cursor = node.next;
        }
        None
    }
}

/// A doubly-linked list of opaque documents behind one read-write lock.
///
/// # Examples
///
/// ```
/// use crabtree::DocList;
///
/// let list = DocList::new();
/// list.push_back(1).unwrap();
/// list.push_front(2).unwrap();
///
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.find_first(|d| *d > 1), Some(2));
/// assert_eq!(list.delete_first(|d| *d == 2), Some(2));
/// assert_eq!(list.len(), 1);
/// ```
#[derive(Debug)]
pub struct DocList<T> {
    core: RwLock<ListCore<T>>,
}

impl<T> DocList<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            core: RwLock::new(ListCore {
                slots: Vec::new(),
                free_list: Vec::new(),
                head: NULL_NODE,
                tail: NULL_NODE,
                len: 0,
            }),
        }
    }

    /// Prepend a document.
    pub fn push_front(&self, doc: T) -> TreeResult<()> {
        self.core.write().push_front(doc)
    }

    /// Append a document.
    pub fn push_back(&self, doc: T) -> TreeResult<()> {
        self.core.write().push_back(doc)
    }

    /// Detach and return the first document.
    pub fn pop_front(&self) -> Option<T> {
        let mut core = self.core.write();
        let head = core.head;
        core.unlink(head)
    }

    /// Detach and return the last document.
    pub fn pop_back(&self) -> Option<T> {
        let mut core = self.core.write();
        let tail = core.tail;
        core.unlink(tail)
    }

    /// Delete the first document matching the predicate, returning it;
    /// `None` when nothing matches and the list is untouched.
    pub fn delete_first(&self, predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let mut core = self.core.write();
        let id = core.find_id(predicate)?;
        core.unlink(id)
    }

    /// Mutate the first document matching the predicate in place. The write
    /// lock covers the whole operation, mutator included. Returns whether a
    /// document matched.
    pub fn update_first(
        &self,
        predicate: impl FnMut(&T) -> bool,
        mutate: impl FnOnce(&mut T),
    ) -> bool {
        let mut core = self.core.write();
        let Some(id) = core.find_id(predicate) else {
            return false;
        };
        if let Some(node) = core.slots.get_mut(id as usize).and_then(|s| s.as_mut()) {
            mutate(&mut node.doc);
            return true;
        }
        false
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.core.read().len
    }

    /// Returns true if the list holds no documents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every document.
    pub fn clear(&self) {
        let mut core = self.core.write();
        core.slots.clear();
        core.free_list.clear();
        core.head = NULL_NODE;
        core.tail = NULL_NODE;
        core.len = 0;
    }

    #[cfg(test)]
    fn check_links(&self) {
        let core = self.core.read();
        let mut count = 0;
        let mut prev = NULL_NODE;
        let mut cursor = core.head;
        while cursor != NULL_NODE {
            let node = core.node(cursor).expect("chain points at a dead slot");
            assert_eq!(node.prev, prev, "broken prev link at {}", cursor);
            prev = cursor;
            cursor = node.next;
            count += 1;
        }
        assert_eq!(core.tail, prev, "tail does not match the last node");
        assert_eq!(core.len, count, "len does not match reachable nodes");
    }
}

impl<T: Clone> DocList<T> {
    /// Clone out the first document matching the predicate.
    pub fn find_first(&self, predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let core = self.core.read();
        let id = core.find_id(predicate)?;
        core.node(id).map(|node| node.doc.clone())
    }

    /// Snapshot all documents in list order.
    pub fn to_vec(&self) -> Vec<T> {
        let core = self.core.read();
        let mut out = Vec::with_capacity(core.len);
        let mut cursor = core.head;
        while cursor != NULL_NODE {
            let Some(node) = core.node(cursor) else {
                break;
            };
            out.push(node.doc.clone());
            cursor = node.next;
        }
        out
    }
}

impl<T> Default for DocList<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DUMP FORMAT
// ============================================================================

impl<T> DocList<T> {
    /// Write a version-1 dump: documents head to tail, 1-based ids.
    pub fn dump_to_writer<W: Write>(
        &self,
        writer: &mut W,
        codec: &impl Codec<T>,
    ) -> TreeResult<()> {
        let core = self.core.read();

        let mut body: Vec<u8> = Vec::new();
        let mut cursor = core.head;
        let mut dump_id: u32 = 1;
        while cursor != NULL_NODE {
            let node = core
                .node(cursor)
                .ok_or_else(|| TreeError::corrupted("list dump", "chain points at a dead slot"))?;
            let payload = encode_to_vec(codec, &node.doc);
            let next_id = if node.next == NULL_NODE { 0 } else { dump_id + 1 };
            body.write_u32::<LittleEndian>(dump_id)?;
            body.write_u32::<LittleEndian>(next_id)?;
            body.write_u32::<LittleEndian>(payload.len() as u32)?;
            body.write_all(&payload)?;
            cursor = node.next;
            dump_id += 1;
        }

        writer.write_u32::<LittleEndian>(LIST_MAGIC)?;
        writer.write_u32::<LittleEndian>(LIST_VERSION)?;
        writer.write_u32::<LittleEndian>(core.len as u32)?;
        writer.write_u64::<LittleEndian>(shift_add_checksum(&body))?;
        writer.write_all(&body)?;
        debug!("dumped list of {} documents", core.len);
        Ok(())
    }

    /// Write a version-1 dump to a file.
    pub fn dump_to_file<P: AsRef<Path>>(&self, path: P, codec: &impl Codec<T>) -> TreeResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.dump_to_writer(&mut writer, codec)?;
        writer.flush()?;
        Ok(())
    }

    /// Reconstruct a list from a version-1 dump, preserving document order.
    pub fn load_from_reader<R: Read>(reader: &mut R, codec: &impl Codec<T>) -> TreeResult<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let mut cursor = Cursor::new(&raw);

        let magic = cursor.take_u32()?;
        if magic != LIST_MAGIC {
            return Err(TreeError::corrupt_dump("header", format!("bad magic {:#x}", magic)));
        }
        let version = cursor.take_u32()?;
        if version != LIST_VERSION {
            return Err(TreeError::corrupt_dump(
                "header",
                format!("unsupported version {}", version),
            ));
        }
        let count = cursor.take_u32()?;
        let checksum = cursor.take_u64()?;

        // Header is 20 bytes; the body follows.
        let body = cursor.take_bytes(raw.len() - 20)?;
        if shift_add_checksum(body) != checksum {
            return Err(TreeError::corrupt_dump("header", "checksum mismatch"));
        }

        let list = Self::new();
        let mut body_cursor = Cursor::new(body);
        for expected_id in 1..=count {
            let id = body_cursor.take_u32()?;
            let next_id = body_cursor.take_u32()?;
            let payload_len = body_cursor.take_u32()? as usize;
            let payload = body_cursor.take_bytes(payload_len)?;

            if id != expected_id {
                return Err(TreeError::corrupt_dump(
                    "body",
                    format!("node id {} out of sequence, expected {}", id, expected_id),
                ));
            }
            let expected_next = if expected_id == count { 0 } else { expected_id + 1 };
            if next_id != expected_next {
                return Err(TreeError::corrupt_dump(
                    "body",
                    format!("node {} links to {}, expected {}", id, next_id, expected_next),
                ));
            }

            let doc = codec
                .decode(payload)
                .ok_or_else(|| TreeError::corrupt_dump("body", "undecodable document"))?;
            list.push_back(doc)?;
        }
        if !body_cursor.is_empty() {
            return Err(TreeError::corrupt_dump("body", "trailing bytes after last node"));
        }
        debug!("loaded list of {} documents", count);
        Ok(list)
    }

    /// Reconstruct a list from a version-1 dump file.
    pub fn load_from_file<P: AsRef<Path>>(path: P, codec: &impl Codec<T>) -> TreeResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load_from_reader(&mut reader, codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StrCodec;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        number: i32,
        name: String,
    }

    fn doc(number: i32, name: &str) -> Doc {
        Doc {
            number,
            name: name.to_string(),
        }
    }

    #[test]
    fn push_and_pop_at_both_ends() {
        let list = DocList::new();
        list.push_back(2).unwrap();
        list.push_front(1).unwrap();
        list.push_back(3).unwrap();
        list.check_links();

        assert_eq!(list.to_vec(), vec![1, 2, 3]);
        assert_eq!(list.pop_front(), Some(1));
        assert_eq!(list.pop_back(), Some(3));
        assert_eq!(list.pop_back(), Some(2));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
        list.check_links();
    }

    #[test]
    fn predicate_flow() {
        let list = DocList::new();
        list.push_back(doc(1, "a")).unwrap();
        list.push_front(doc(2, "b")).unwrap();

        let renamed = list.update_first(|d| d.number == 1, |d| d.name = "alpha".to_string());
        assert!(renamed);
        assert_eq!(
            list.find_first(|d| d.number == 1),
            Some(doc(1, "alpha"))
        );

        assert_eq!(list.delete_first(|d| d.number == 1), Some(doc(1, "alpha")));
        assert_eq!(list.len(), 1);
        assert_eq!(list.find_first(|d| d.number == 2), Some(doc(2, "b")));
        list.check_links();
    }

    #[test]
    fn missing_predicate_matches_nothing() {
        let list = DocList::new();
        list.push_back(doc(1, "a")).unwrap();

        assert_eq!(list.find_first(|d| d.number == 9), None);
        assert_eq!(list.delete_first(|d| d.number == 9), None);
        assert!(!list.update_first(|d| d.number == 9, |_| unreachable!()));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn delete_relinks_the_middle() {
        let list = DocList::new();
        for n in 1..=5 {
            list.push_back(n).unwrap();
        }
        assert_eq!(list.delete_first(|d| *d == 3), Some(3));
        list.check_links();
        assert_eq!(list.to_vec(), vec![1, 2, 4, 5]);

        // Freed slot is reused without disturbing order.
        list.push_back(6).unwrap();
        list.check_links();
        assert_eq!(list.to_vec(), vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn clear_then_reuse() {
        let list = DocList::new();
        for n in 0..10 {
            list.push_back(n).unwrap();
        }
        list.clear();
        assert!(list.is_empty());
        list.push_back(42).unwrap();
        assert_eq!(list.to_vec(), vec![42]);
        list.check_links();
    }

    #[test]
    fn dump_round_trip() {
        let list = DocList::new();
        for word in ["alpha", "beta", "gamma", ""] {
            list.push_back(word.to_string()).unwrap();
        }
        let mut bytes = Vec::new();
        list.dump_to_writer(&mut bytes, &StrCodec).unwrap();

        let loaded = DocList::<String>::load_from_reader(&mut bytes.as_slice(), &StrCodec).unwrap();
        assert_eq!(loaded.to_vec(), list.to_vec());
        loaded.check_links();
    }

    #[test]
    fn dump_rejects_corruption() {
        let list = DocList::new();
        list.push_back("doc".to_string()).unwrap();
        let mut bytes = Vec::new();
        list.dump_to_writer(&mut bytes, &StrCodec).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xff;
        assert!(DocList::<String>::load_from_reader(&mut bad_magic.as_slice(), &StrCodec).is_err());

        let mut bad_body = bytes.clone();
        let last = bad_body.len() - 1;
        bad_body[last] ^= 0x01;
        assert!(DocList::<String>::load_from_reader(&mut bad_body.as_slice(), &StrCodec).is_err());

        let truncated = &bytes[..bytes.len() - 2];
        assert!(DocList::<String>::load_from_reader(&mut &truncated[..], &StrCodec).is_err());
    }

    #[test]
    fn empty_list_round_trips() {
        let list = DocList::<String>::new();
        let mut bytes = Vec::new();
        list.dump_to_writer(&mut bytes, &StrCodec).unwrap();
        let loaded = DocList::<String>::load_from_reader(&mut bytes.as_slice(), &StrCodec).unwrap();
        assert!(loaded.is_empty());
    }
}
