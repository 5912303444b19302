//! On-disk dump format, version 1.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header:  magic u32 | version u32 | order u32 | node_count u32
//!          | record_count u32 | checksum u64
//! node:    node_id u32 | parent_id u32 | num_keys u32 | is_leaf u8 + pad[3]
//!          | next_leaf_id u32 | payload_len u32 | payload
//! ```
//!
//! Leaf payload holds `num_keys` entries of (`u32` key length, key bytes,
//! `u32` value length, value bytes); branch payload holds the keys the same
//! way followed by `num_keys + 1` `u32` child ids. Node ids are 1-based in
//! breadth-first order; id 0 means "none", so the root's parent is 0 and a
//! rightmost leaf's successor is 0. The checksum is a shift-add hash over
//! every body byte after the header.
//!
//! Loading reconstructs the arena nodes, parent links, and the sibling
//! chain, and re-checks the full invariant set before handing the tree
//! back; any mismatch is reported as `CorruptDump`.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicUsize;

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use parking_lot::RwLock;

use crate::arena::NodeArena;
use crate::codec::{encode_to_vec, Codec};
use crate::error::{TreeError, TreeResult};
use crate::search::SearchPolicy;
use crate::types::{BPlusTree, BranchNode, LeafNode, NodeRef, Record, MIN_ORDER, NULL_NODE};

/// `"BTRE"` interpreted as a 32-bit integer.
pub const TREE_MAGIC: u32 = 0x4254_5245;
/// Current tree dump format version.
pub const TREE_VERSION: u32 = 1;
/// `"LLIS"` interpreted as a 32-bit integer.
pub const LIST_MAGIC: u32 = 0x4C4C_4953;
/// Current list dump format version.
pub const LIST_VERSION: u32 = 1;

/// Shift-add integrity hash over the body bytes.
pub(crate) fn shift_add_checksum(bytes: &[u8]) -> u64 {
    let mut checksum: u64 = 0;
    for &byte in bytes {
        checksum = checksum
            .wrapping_shl(5)
            .wrapping_add(checksum)
            .wrapping_add(u64::from(byte));
    }
    checksum
}

// ============================================================================
// BODY CURSOR
// ============================================================================

/// Byte cursor over a dump body; every under-run is a `CorruptDump`.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn take_bytes(&mut self, len: usize) -> TreeResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(TreeError::corrupt_dump(
                "payload",
                format!("truncated: wanted {} bytes, {} left", len, self.buf.len()),
            ));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn take_u8(&mut self) -> TreeResult<u8> {
        Ok(self.take_bytes(1)?[0])
    }

    pub(crate) fn take_u32(&mut self) -> TreeResult<u32> {
        let bytes = self.take_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub(crate) fn take_u64(&mut self) -> TreeResult<u64> {
        let bytes = self.take_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

// ============================================================================
// DUMP WRITER
// ============================================================================

/// Per-node snapshot taken during the collection walk.
enum Snapshot {
    Leaf {
        dump_id: u32,
        parent: Option<NodeRef>,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        next: Option<NodeRef>,
    },
    Branch {
        dump_id: u32,
        parent: Option<NodeRef>,
        keys: Vec<Vec<u8>>,
        children: Vec<NodeRef>,
    },
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Write a version-1 dump of the tree.
    ///
    /// Nodes are visited breadth-first under their read locks; each node is
    /// captured at the instant its lock was held. Callers wanting an exact
    /// image of a shared tree must quiesce writers first.
    pub fn dump_to_writer<W: Write>(
        &self,
        writer: &mut W,
        key_codec: &impl Codec<K>,
        value_codec: &impl Codec<V>,
    ) -> TreeResult<()> {
        let root = self.root_ref();
        let mut ids: HashMap<NodeRef, u32> = HashMap::new();
        let mut queue: VecDeque<NodeRef> = VecDeque::new();
        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut next_id: u32 = 1;
        let mut record_count: u32 = 0;

        ids.insert(root, next_id);
        next_id += 1;
        queue.push_back(root);

        while let Some(node) = queue.pop_front() {
            let dump_id = ids[&node];
            let parent = self.parent_ref_of(node);
            match node {
                NodeRef::Leaf(id) => {
                    let leaf = self.leaf_handle(id)?.read_arc();
                    let mut entries = Vec::with_capacity(leaf.len());
                    for i in 0..leaf.len() {
                        entries.push((
                            encode_to_vec(key_codec, &leaf.keys[i]),
                            encode_to_vec(value_codec, leaf.records[i].value()),
                        ));
                    }
                    record_count += leaf.len() as u32;
                    let next = (leaf.next != NULL_NODE).then_some(NodeRef::Leaf(leaf.next));
                    snapshots.push(Snapshot::Leaf {
                        dump_id,
                        parent,
                        entries,
                        next,
                    });
                }
                NodeRef::Branch(id) => {
                    let branch = self.branch_handle(id)?.read_arc();
                    let keys = branch
                        .keys
                        .iter()
                        .map(|k| encode_to_vec(key_codec, k))
                        .collect();
                    for child in &branch.children {
                        ids.insert(*child, next_id);
                        next_id += 1;
                        queue.push_back(*child);
                    }
                    snapshots.push(Snapshot::Branch {
                        dump_id,
                        parent,
                        keys,
                        children: branch.children.clone(),
                    });
                }
            }
        }

        let mut body: Vec<u8> = Vec::new();
        for snapshot in &snapshots {
            write_snapshot(&mut body, snapshot, &ids)?;
        }

        writer.write_u32::<LittleEndian>(TREE_MAGIC)?;
        writer.write_u32::<LittleEndian>(TREE_VERSION)?;
        writer.write_u32::<LittleEndian>(self.order as u32)?;
        writer.write_u32::<LittleEndian>(snapshots.len() as u32)?;
        writer.write_u32::<LittleEndian>(record_count)?;
        writer.write_u64::<LittleEndian>(shift_add_checksum(&body))?;
        writer.write_all(&body)?;
        debug!(
            "dumped {} nodes / {} records",
            snapshots.len(),
            record_count
        );
        Ok(())
    }

    /// Write a version-1 dump to a file.
    pub fn dump_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        key_codec: &impl Codec<K>,
        value_codec: &impl Codec<V>,
    ) -> TreeResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.dump_to_writer(&mut writer, key_codec, value_codec)?;
        writer.flush()?;
        Ok(())
    }

    fn parent_ref_of(&self, node: NodeRef) -> Option<NodeRef> {
        let parent = match node {
            NodeRef::Leaf(id) => self.leaf_arena.parent_of(id),
            NodeRef::Branch(id) => self.branch_arena.parent_of(id),
        };
        (parent != NULL_NODE).then_some(NodeRef::Branch(parent))
    }
}

fn write_snapshot(
    body: &mut Vec<u8>,
    snapshot: &Snapshot,
    ids: &HashMap<NodeRef, u32>,
) -> TreeResult<()> {
    let resolve = |node: &Option<NodeRef>| -> TreeResult<u32> {
        match node {
            None => Ok(0),
            Some(r) => ids
                .get(r)
                .copied()
                .ok_or_else(|| TreeError::corrupted("dump", format!("unmapped node {:?}", r))),
        }
    };

    match snapshot {
        Snapshot::Leaf {
            dump_id,
            parent,
            entries,
            next,
        } => {
            let mut payload: Vec<u8> = Vec::new();
            for (key, value) in entries {
                payload.write_u32::<LittleEndian>(key.len() as u32)?;
                payload.extend_from_slice(key);
                payload.write_u32::<LittleEndian>(value.len() as u32)?;
                payload.extend_from_slice(value);
            }
            write_node_header(
                body,
                *dump_id,
                resolve(parent)?,
                entries.len() as u32,
                true,
                resolve(next)?,
                &payload,
            )
        }
        Snapshot::Branch {
            dump_id,
            parent,
            keys,
            children,
        } => {
            let mut payload: Vec<u8> = Vec::new();
            for key in keys {
                payload.write_u32::<LittleEndian>(key.len() as u32)?;
                payload.extend_from_slice(key);
            }
            for child in children {
                let child_id = resolve(&Some(*child))?;
                payload.write_u32::<LittleEndian>(child_id)?;
            }
            write_node_header(
                body,
                *dump_id,
                resolve(parent)?,
                keys.len() as u32,
                false,
                0,
                &payload,
            )
        }
    }
}

fn write_node_header(
    body: &mut Vec<u8>,
    node_id: u32,
    parent_id: u32,
    num_keys: u32,
    is_leaf: bool,
    next_leaf_id: u32,
    payload: &[u8],
) -> TreeResult<()> {
    body.write_u32::<LittleEndian>(node_id)?;
    body.write_u32::<LittleEndian>(parent_id)?;
    body.write_u32::<LittleEndian>(num_keys)?;
    body.write_u8(u8::from(is_leaf))?;
    body.write_all(&[0u8; 3])?;
    body.write_u32::<LittleEndian>(next_leaf_id)?;
    body.write_u32::<LittleEndian>(payload.len() as u32)?;
    body.write_all(payload)?;
    Ok(())
}

// ============================================================================
// DUMP LOADER
// ============================================================================

struct ParsedLeaf<K, V> {
    dump_id: u32,
    parent: u32,
    next: u32,
    keys: Vec<K>,
    values: Vec<V>,
}

struct ParsedBranch<K> {
    dump_id: u32,
    parent: u32,
    keys: Vec<K>,
    children: Vec<u32>,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Reconstruct a tree from a version-1 dump.
    ///
    /// The rebuilt tree has the same key→value multiset and the same
    /// sibling-chain order as the source tree at the moment of the dump.
    pub fn load_from_reader<R: Read>(
        reader: &mut R,
        key_codec: &impl Codec<K>,
        value_codec: &impl Codec<V>,
    ) -> TreeResult<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let mut cursor = Cursor::new(&raw);

        let magic = cursor.take_u32()?;
        if magic != TREE_MAGIC {
            return Err(TreeError::corrupt_dump("header", format!("bad magic {:#x}", magic)));
        }
        let version = cursor.take_u32()?;
        if version != TREE_VERSION {
            return Err(TreeError::corrupt_dump(
                "header",
                format!("unsupported version {}", version),
            ));
        }
        let order = cursor.take_u32()? as usize;
        if order < MIN_ORDER {
            return Err(TreeError::corrupt_dump("header", format!("order {}", order)));
        }
        let node_count = cursor.take_u32()?;
        let record_count = cursor.take_u32()?;
        let checksum = cursor.take_u64()?;

        // Header is 28 bytes; everything after it is the checksummed body.
        let body = cursor.take_bytes(raw.len() - 28)?;
        if shift_add_checksum(body) != checksum {
            return Err(TreeError::corrupt_dump("header", "checksum mismatch"));
        }

        let (leaves, branches): (Vec<ParsedLeaf<K, V>>, Vec<ParsedBranch<K>>) =
            parse_nodes(body, node_count, key_codec, value_codec)?;
        let total: usize = leaves.iter().map(|l| l.keys.len()).sum();
        if total != record_count as usize {
            return Err(TreeError::corrupt_dump(
                "body",
                format!("{} records present, header says {}", total, record_count),
            ));
        }

        let tree = assemble_tree(order, leaves, branches, total)?;
        tree.check_invariants_detailed()
            .map_err(|e| TreeError::corrupt_dump("validation", e))?;
        debug!("loaded {} nodes / {} records", node_count, total);
        Ok(tree)
    }

    /// Reconstruct a tree from a version-1 dump file.
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        key_codec: &impl Codec<K>,
        value_codec: &impl Codec<V>,
    ) -> TreeResult<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load_from_reader(&mut reader, key_codec, value_codec)
    }
}

#[allow(clippy::type_complexity)]
fn parse_nodes<K, V>(
    body: &[u8],
    node_count: u32,
    key_codec: &impl Codec<K>,
    value_codec: &impl Codec<V>,
) -> TreeResult<(Vec<ParsedLeaf<K, V>>, Vec<ParsedBranch<K>>)> {
    let mut cursor = Cursor::new(body);
    let mut leaves = Vec::new();
    let mut branches = Vec::new();

    for _ in 0..node_count {
        let dump_id = cursor.take_u32()?;
        let parent = cursor.take_u32()?;
        let num_keys = cursor.take_u32()? as usize;
        let is_leaf = cursor.take_u8()? != 0;
        cursor.take_bytes(3)?;
        let next = cursor.take_u32()?;
        let payload_len = cursor.take_u32()? as usize;
        let mut payload = Cursor::new(cursor.take_bytes(payload_len)?);

        if dump_id == 0 {
            return Err(TreeError::corrupt_dump("body", "node id 0"));
        }

        if is_leaf {
            let mut keys = Vec::with_capacity(num_keys);
            let mut values = Vec::with_capacity(num_keys);
            for _ in 0..num_keys {
                let key_len = payload.take_u32()? as usize;
                let key = key_codec
                    .decode(payload.take_bytes(key_len)?)
                    .ok_or_else(|| TreeError::corrupt_dump("leaf payload", "undecodable key"))?;
                let value_len = payload.take_u32()? as usize;
                let value = value_codec
                    .decode(payload.take_bytes(value_len)?)
                    .ok_or_else(|| TreeError::corrupt_dump("leaf payload", "undecodable value"))?;
                keys.push(key);
                values.push(value);
            }
            leaves.push(ParsedLeaf {
                dump_id,
                parent,
                next,
                keys,
                values,
            });
        } else {
            let mut keys = Vec::with_capacity(num_keys);
            for _ in 0..num_keys {
                let key_len = payload.take_u32()? as usize;
                let key = key_codec
                    .decode(payload.take_bytes(key_len)?)
                    .ok_or_else(|| TreeError::corrupt_dump("branch payload", "undecodable key"))?;
                keys.push(key);
            }
            let mut children = Vec::with_capacity(num_keys + 1);
            for _ in 0..num_keys + 1 {
                children.push(payload.take_u32()?);
            }
            branches.push(ParsedBranch {
                dump_id,
                parent,
                keys,
                children,
            });
        }
        if !payload.is_empty() {
            return Err(TreeError::corrupt_dump("body", "payload has trailing bytes"));
        }
    }

    if !cursor.is_empty() {
        return Err(TreeError::corrupt_dump("body", "trailing bytes after last node"));
    }
    Ok((leaves, branches))
}

fn assemble_tree<K: Ord + Clone, V>(
    order: usize,
    leaves: Vec<ParsedLeaf<K, V>>,
    branches: Vec<ParsedBranch<K>>,
    total_records: usize,
) -> TreeResult<BPlusTree<K, V>> {
    let leaf_arena: NodeArena<LeafNode<K, V>> = NodeArena::new();
    let branch_arena: NodeArena<BranchNode<K, V>> = NodeArena::new();
    let mut by_dump_id: HashMap<u32, NodeRef> = HashMap::new();

    let mut leaf_links = Vec::with_capacity(leaves.len());
    let mut roots = Vec::new();
    for leaf in leaves {
        let records = leaf.values.into_iter().map(Record::new).collect();
        let id = leaf_arena.allocate(LeafNode::with_data(leaf.keys, records, NULL_NODE))?;
        if by_dump_id.insert(leaf.dump_id, NodeRef::Leaf(id)).is_some() {
            return Err(TreeError::corrupt_dump("body", format!("duplicate id {}", leaf.dump_id)));
        }
        if leaf.parent == 0 {
            roots.push(NodeRef::Leaf(id));
        }
        leaf_links.push((id, leaf.next));
    }

    let mut branch_links = Vec::with_capacity(branches.len());
    for branch in branches {
        let id = branch_arena.allocate(BranchNode {
            keys: branch.keys,
            children: Vec::new(),
            _marker: std::marker::PhantomData,
        })?;
        if by_dump_id
            .insert(branch.dump_id, NodeRef::Branch(id))
            .is_some()
        {
            return Err(TreeError::corrupt_dump("body", format!("duplicate id {}", branch.dump_id)));
        }
        if branch.parent == 0 {
            roots.push(NodeRef::Branch(id));
        }
        branch_links.push((id, branch.children));
    }

    // Wire the sibling chain.
    for (id, next_dump) in leaf_links {
        if next_dump == 0 {
            continue;
        }
        let next_ref = by_dump_id
            .get(&next_dump)
            .ok_or_else(|| TreeError::corrupt_dump("chain", format!("dangling id {}", next_dump)))?;
        let NodeRef::Leaf(next_id) = next_ref else {
            return Err(TreeError::corrupt_dump("chain", "successor is not a leaf"));
        };
        leaf_arena
            .get(id)
            .ok_or_else(|| TreeError::corrupted("load", "lost leaf"))?
            .write()
            .next = *next_id;
    }

    // Wire children and parent back-references.
    for (id, child_dump_ids) in branch_links {
        let handle = branch_arena
            .get(id)
            .ok_or_else(|| TreeError::corrupted("load", "lost branch"))?;
        let mut guard = handle.write();
        for child_dump in child_dump_ids {
            let child = *by_dump_id.get(&child_dump).ok_or_else(|| {
                TreeError::corrupt_dump("body", format!("dangling child id {}", child_dump))
            })?;
            match child {
                NodeRef::Leaf(cid) => leaf_arena.set_parent(cid, id),
                NodeRef::Branch(cid) => branch_arena.set_parent(cid, id),
            }
            guard.children.push(child);
        }
    }

    if roots.len() != 1 {
        return Err(TreeError::corrupt_dump(
            "body",
            format!("expected one root, found {}", roots.len()),
        ));
    }
    let root = roots[0];

    Ok(BPlusTree {
        order,
        search: SearchPolicy::default(),
        root: RwLock::new(root),
        leaf_arena,
        branch_arena,
        len: AtomicUsize::new(total_records),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{I32Codec, StrCodec};

    fn sample_tree(entries: usize) -> BPlusTree<i32, String> {
        let tree = BPlusTree::new(4).unwrap();
        for k in 0..entries as i32 {
            tree.insert(k, format!("value-{}", k)).unwrap();
        }
        tree
    }

    fn dump(tree: &BPlusTree<i32, String>) -> Vec<u8> {
        let mut bytes = Vec::new();
        tree.dump_to_writer(&mut bytes, &I32Codec, &StrCodec).unwrap();
        bytes
    }

    #[test]
    fn checksum_matches_reference_values() {
        assert_eq!(shift_add_checksum(&[]), 0);
        // c = c*33 + byte, starting from zero.
        assert_eq!(shift_add_checksum(&[1]), 1);
        assert_eq!(shift_add_checksum(&[1, 2]), 35);
        assert_eq!(shift_add_checksum(b"BTRE"), 66 * 33 * 33 * 33 + 84 * 33 * 33 + 82 * 33 + 69);
    }

    #[test]
    fn header_layout_is_stable() {
        let tree = sample_tree(0);
        let bytes = dump(&tree);
        assert_eq!(&bytes[0..4], &TREE_MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &TREE_VERSION.to_le_bytes());
        assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_le_bytes()); // one empty root leaf
        assert_eq!(&bytes[16..20], &0u32.to_le_bytes());
    }

    #[test]
    fn round_trip_preserves_entries_and_chain_order() {
        for entries in [0, 1, 5, 64, 500] {
            let tree = sample_tree(entries);
            let bytes = dump(&tree);
            let loaded =
                BPlusTree::<i32, String>::load_from_reader(&mut bytes.as_slice(), &I32Codec, &StrCodec)
                    .unwrap();
            assert_eq!(loaded.items(), tree.items(), "{} entries", entries);
            assert_eq!(loaded.leaf_sizes(), tree.leaf_sizes());
            assert_eq!(loaded.order(), tree.order());
            loaded.check_invariants_detailed().unwrap();
        }
    }

    #[test]
    fn loaded_tree_accepts_further_mutation() {
        let tree = sample_tree(100);
        let bytes = dump(&tree);
        let loaded =
            BPlusTree::<i32, String>::load_from_reader(&mut bytes.as_slice(), &I32Codec, &StrCodec)
                .unwrap();
        loaded.insert(1000, "late".into()).unwrap();
        loaded.remove(&0).unwrap();
        loaded.check_invariants_detailed().unwrap();
        assert_eq!(loaded.len(), 100);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let tree = sample_tree(10);
        let mut bytes = dump(&tree);
        bytes[0] ^= 0xff;
        let err = BPlusTree::<i32, String>::load_from_reader(&mut bytes.as_slice(), &I32Codec, &StrCodec)
            .unwrap_err();
        assert!(matches!(err, TreeError::CorruptDump(_)));
    }

    #[test]
    fn bad_version_is_rejected() {
        let tree = sample_tree(10);
        let mut bytes = dump(&tree);
        bytes[4] = 99;
        assert!(matches!(
            BPlusTree::<i32, String>::load_from_reader(&mut bytes.as_slice(), &I32Codec, &StrCodec),
            Err(TreeError::CorruptDump(_))
        ));
    }

    #[test]
    fn flipped_body_byte_fails_the_checksum() {
        let tree = sample_tree(10);
        let mut bytes = dump(&tree);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            BPlusTree::<i32, String>::load_from_reader(&mut bytes.as_slice(), &I32Codec, &StrCodec),
            Err(TreeError::CorruptDump(_))
        ));
    }

    #[test]
    fn truncated_dump_is_rejected() {
        let tree = sample_tree(10);
        let bytes = dump(&tree);
        for cut in [3, 20, bytes.len() - 1] {
            assert!(matches!(
                BPlusTree::<i32, String>::load_from_reader(
                    &mut &bytes[..cut],
                    &I32Codec,
                    &StrCodec
                ),
                Err(TreeError::CorruptDump(_))
            ));
        }
    }

    #[test]
    fn file_round_trip() {
        let tree = sample_tree(64);
        let path = std::env::temp_dir().join(format!(
            "crabtree-dump-{}-{:?}.bin",
            std::process::id(),
            std::thread::current().id()
        ));
        tree.dump_to_file(&path, &I32Codec, &StrCodec).unwrap();
        let loaded = BPlusTree::<i32, String>::load_from_file(&path, &I32Codec, &StrCodec).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.items(), tree.items());
    }
}
