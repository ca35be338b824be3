//! # Slim Tree Adapter
//!
//! A disk-resident metric tree implementing the `MetricIndex` port.
//!
//! Every node occupies exactly one page of the backing [`PageFile`]. A leaf
//! holds object records; a branch holds entries of (representative object,
//! covering radius, child page). The covering radius bounds the distance
//! from the representative to anything in its subtree, which is what lets
//! range queries prune whole subtrees through the triangle inequality:
//! a child can only contain hits when `d(q, rep) <= radius + covering`.
//!
//! Insertion descends to the nearest representative at each level,
//! stretching covering radii on the way down. A node that no longer fits
//! its page splits around two far-apart seed objects, and the split
//! propagates upward, growing the tree at the root.
//!
//! All distance evaluations go through the shared [`WaveletDistance`], so
//! the distance-call statistics of a query batch include the tree's own
//! routing work, and all node I/O goes through the page file, so disk
//! statistics reflect real page accesses.

use std::path::Path;
use std::sync::Arc;

use crate::core::{ComplexObject, WaveletDistance, HEADER_SIZE};
use crate::ports::{IndexError, IndexResult, MetricIndex};

use super::pager::PageFile;

const NODE_LEAF: u8 = 0;
const NODE_BRANCH: u8 = 1;

/// Node header: kind byte + entry count
const NODE_HEADER: usize = 1 + 4;

/// Per-entry overhead in a branch: covering radius (f64) + child page (u32)
const BRANCH_ENTRY_OVERHEAD: usize = 8 + 4;

/// One routing entry of a branch node
#[derive(Debug, Clone)]
struct BranchEntry {
    rep: ComplexObject,
    radius: f64,
    child: u32,
}

/// A materialized tree node
#[derive(Debug)]
enum Node {
    Leaf(Vec<ComplexObject>),
    Branch(Vec<BranchEntry>),
}

impl Node {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Node::Leaf(objects) => {
                buf.push(NODE_LEAF);
                buf.extend_from_slice(&(objects.len() as u32).to_le_bytes());
                for object in objects {
                    buf.extend_from_slice(&object.to_bytes());
                }
            }
            Node::Branch(entries) => {
                buf.push(NODE_BRANCH);
                buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
                for entry in entries {
                    buf.extend_from_slice(&entry.rep.to_bytes());
                    buf.extend_from_slice(&entry.radius.to_le_bytes());
                    buf.extend_from_slice(&entry.child.to_le_bytes());
                }
            }
        }
        buf
    }

    fn decode(bytes: &[u8]) -> IndexResult<Self> {
        if bytes.len() < NODE_HEADER {
            return Err(IndexError::Corrupt("node shorter than its header".into()));
        }
        let kind = bytes[0];
        let mut count_bytes = [0u8; 4];
        count_bytes.copy_from_slice(&bytes[1..5]);
        let count = u32::from_le_bytes(count_bytes) as usize;

        let mut cursor = NODE_HEADER;
        match kind {
            NODE_LEAF => {
                let mut objects = Vec::with_capacity(count);
                for _ in 0..count {
                    objects.push(read_record(bytes, &mut cursor)?);
                }
                Ok(Node::Leaf(objects))
            }
            NODE_BRANCH => {
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let rep = read_record(bytes, &mut cursor)?;
                    if bytes.len() < cursor + BRANCH_ENTRY_OVERHEAD {
                        return Err(IndexError::Corrupt(
                            "branch entry tail past node end".into(),
                        ));
                    }
                    let mut radius_bytes = [0u8; 8];
                    radius_bytes.copy_from_slice(&bytes[cursor..cursor + 8]);
                    let radius = f64::from_le_bytes(radius_bytes);
                    cursor += 8;
                    let mut child_bytes = [0u8; 4];
                    child_bytes.copy_from_slice(&bytes[cursor..cursor + 4]);
                    let child = u32::from_le_bytes(child_bytes);
                    cursor += 4;
                    entries.push(BranchEntry { rep, radius, child });
                }
                Ok(Node::Branch(entries))
            }
            other => Err(IndexError::Corrupt(format!("unknown node kind {other}"))),
        }
    }
}

fn read_record(bytes: &[u8], cursor: &mut usize) -> IndexResult<ComplexObject> {
    let slice = &bytes[*cursor..];
    let size = ComplexObject::peek_record_size(slice)?;
    if slice.len() < size {
        return Err(IndexError::Corrupt("record body past node end".into()));
    }
    let object = ComplexObject::unserialize(&slice[..size])?;
    *cursor += size;
    Ok(object)
}

fn leaf_size(objects: &[ComplexObject]) -> usize {
    NODE_HEADER
        + objects
            .iter()
            .map(|object| object.serialized_size())
            .sum::<usize>()
}

fn branch_size(entries: &[BranchEntry]) -> usize {
    NODE_HEADER
        + entries
            .iter()
            .map(|entry| entry.rep.serialized_size() + BRANCH_ENTRY_OVERHEAD)
            .sum::<usize>()
}

/// Disk-resident metric tree over complex objects
pub struct SlimTree {
    pager: PageFile,
    evaluator: Arc<WaveletDistance>,
    root: Option<u32>,
    count: usize,
}

impl SlimTree {
    /// Create a tree backed by a fresh page file at `path`
    pub fn create(
        path: impl AsRef<Path>,
        page_size: usize,
        evaluator: Arc<WaveletDistance>,
    ) -> IndexResult<Self> {
        if page_size < NODE_HEADER + HEADER_SIZE + BRANCH_ENTRY_OVERHEAD {
            return Err(IndexError::Backend(format!(
                "page size {page_size} is too small for a tree node"
            )));
        }
        let pager = PageFile::create(path, page_size)?;
        Ok(Self {
            pager,
            evaluator,
            root: None,
            count: 0,
        })
    }

    /// The shared distance evaluator
    pub fn evaluator(&self) -> &Arc<WaveletDistance> {
        &self.evaluator
    }

    fn read_node(&mut self, page: u32) -> IndexResult<Node> {
        let bytes = self.pager.read_page(page)?;
        Node::decode(&bytes)
    }

    fn write_node(&mut self, page: u32, node: &Node) -> IndexResult<()> {
        let bytes = node.encode();
        if bytes.len() > self.pager.page_size() {
            return Err(IndexError::Corrupt(format!(
                "node of {} bytes exceeds the page size {}",
                bytes.len(),
                self.pager.page_size()
            )));
        }
        self.pager.write_page(page, &bytes)?;
        Ok(())
    }

    /// Insert below `page`; a `Some` result is the pair replacing its entry
    fn insert_into(
        &mut self,
        page: u32,
        object: &ComplexObject,
    ) -> IndexResult<Option<(BranchEntry, BranchEntry)>> {
        match self.read_node(page)? {
            Node::Leaf(mut objects) => {
                objects.push(object.clone());
                if leaf_size(&objects) <= self.pager.page_size() {
                    self.write_node(page, &Node::Leaf(objects))?;
                    Ok(None)
                } else {
                    self.split_leaf(page, objects).map(Some)
                }
            }
            Node::Branch(mut entries) => {
                let mut best = 0;
                let mut best_distance = f64::INFINITY;
                for (i, entry) in entries.iter().enumerate() {
                    let d = self.evaluator.distance(object, &entry.rep)?;
                    if d < best_distance {
                        best_distance = d;
                        best = i;
                    }
                }

                let child = entries[best].child;
                let split = self.insert_into(child, object)?;
                match split {
                    None => {
                        // The object landed inside this subtree, so its
                        // covering radius must reach at least that far.
                        if best_distance > entries[best].radius {
                            entries[best].radius = best_distance;
                        }
                        self.write_node(page, &Node::Branch(entries))?;
                        Ok(None)
                    }
                    Some((left, right)) => {
                        entries[best] = left;
                        entries.push(right);
                        if branch_size(&entries) <= self.pager.page_size() {
                            self.write_node(page, &Node::Branch(entries))?;
                            Ok(None)
                        } else {
                            self.split_branch(page, entries).map(Some)
                        }
                    }
                }
            }
        }
    }

    /// Two far-apart seeds: the item farthest from the first item, then the
    /// item farthest from that one
    fn pick_seeds(&self, items: &[&ComplexObject]) -> IndexResult<(usize, usize)> {
        let mut a = 0;
        let mut best = -1.0;
        for (i, item) in items.iter().enumerate().skip(1) {
            let d = self.evaluator.distance(item, items[0])?;
            if d > best {
                best = d;
                a = i;
            }
        }
        let mut b = usize::from(a == 0);
        let mut best = -1.0;
        for (i, item) in items.iter().enumerate() {
            if i == a {
                continue;
            }
            let d = self.evaluator.distance(item, items[a])?;
            if d > best {
                best = d;
                b = i;
            }
        }
        Ok((a, b))
    }

    fn split_leaf(
        &mut self,
        page: u32,
        objects: Vec<ComplexObject>,
    ) -> IndexResult<(BranchEntry, BranchEntry)> {
        let refs: Vec<&ComplexObject> = objects.iter().collect();
        let (seed_a, seed_b) = self.pick_seeds(&refs)?;
        let rep_a = objects[seed_a].clone();
        let rep_b = objects[seed_b].clone();

        // Seeds anchor their sides before anything else is placed.
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut rest = Vec::new();
        for (i, object) in objects.into_iter().enumerate() {
            if i == seed_a {
                left.push(object);
            } else if i == seed_b {
                right.push(object);
            } else {
                rest.push(object);
            }
        }

        let capacity = self.pager.page_size();
        let mut left_bytes = NODE_HEADER + left[0].serialized_size();
        let mut right_bytes = NODE_HEADER + right[0].serialized_size();
        let mut left_radius: f64 = 0.0;
        let mut right_radius: f64 = 0.0;

        for object in rest {
            let size = object.serialized_size();
            let da = self.evaluator.distance(&object, &rep_a)?;
            let db = self.evaluator.distance(&object, &rep_b)?;

            // Prefer the nearer seed, spilling to the other side when the
            // nearer page is already full.
            let to_left = if da <= db {
                left_bytes + size <= capacity
            } else {
                right_bytes + size > capacity
            };
            if to_left {
                if left_bytes + size > capacity {
                    return Err(IndexError::Corrupt(
                        "split cannot place every object on a page".into(),
                    ));
                }
                left_bytes += size;
                left_radius = left_radius.max(da);
                left.push(object);
            } else {
                if right_bytes + size > capacity {
                    return Err(IndexError::Corrupt(
                        "split cannot place every object on a page".into(),
                    ));
                }
                right_bytes += size;
                right_radius = right_radius.max(db);
                right.push(object);
            }
        }

        let right_page = self.pager.allocate();
        self.write_node(page, &Node::Leaf(left))?;
        self.write_node(right_page, &Node::Leaf(right))?;

        Ok((
            BranchEntry {
                rep: rep_a,
                radius: left_radius,
                child: page,
            },
            BranchEntry {
                rep: rep_b,
                radius: right_radius,
                child: right_page,
            },
        ))
    }

    fn split_branch(
        &mut self,
        page: u32,
        entries: Vec<BranchEntry>,
    ) -> IndexResult<(BranchEntry, BranchEntry)> {
        let refs: Vec<&ComplexObject> = entries.iter().map(|entry| &entry.rep).collect();
        let (seed_a, seed_b) = self.pick_seeds(&refs)?;
        let rep_a = entries[seed_a].rep.clone();
        let rep_b = entries[seed_b].rep.clone();

        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut rest = Vec::new();
        for (i, entry) in entries.into_iter().enumerate() {
            if i == seed_a {
                left.push(entry);
            } else if i == seed_b {
                right.push(entry);
            } else {
                rest.push(entry);
            }
        }

        let capacity = self.pager.page_size();
        let entry_size =
            |entry: &BranchEntry| entry.rep.serialized_size() + BRANCH_ENTRY_OVERHEAD;
        let mut left_bytes = NODE_HEADER + entry_size(&left[0]);
        let mut right_bytes = NODE_HEADER + entry_size(&right[0]);
        // A subtree reaches as far as its representative's own covering
        // radius past the new representative.
        let mut left_radius: f64 = left[0].radius;
        let mut right_radius: f64 = right[0].radius;

        for entry in rest {
            let size = entry_size(&entry);
            let da = self.evaluator.distance(&entry.rep, &rep_a)?;
            let db = self.evaluator.distance(&entry.rep, &rep_b)?;

            let to_left = if da <= db {
                left_bytes + size <= capacity
            } else {
                right_bytes + size > capacity
            };
            if to_left {
                if left_bytes + size > capacity {
                    return Err(IndexError::Corrupt(
                        "split cannot place every entry on a page".into(),
                    ));
                }
                left_bytes += size;
                left_radius = left_radius.max(da + entry.radius);
                left.push(entry);
            } else {
                if right_bytes + size > capacity {
                    return Err(IndexError::Corrupt(
                        "split cannot place every entry on a page".into(),
                    ));
                }
                right_bytes += size;
                right_radius = right_radius.max(db + entry.radius);
                right.push(entry);
            }
        }

        let right_page = self.pager.allocate();
        self.write_node(page, &Node::Branch(left))?;
        self.write_node(right_page, &Node::Branch(right))?;

        Ok((
            BranchEntry {
                rep: rep_a,
                radius: left_radius,
                child: page,
            },
            BranchEntry {
                rep: rep_b,
                radius: right_radius,
                child: right_page,
            },
        ))
    }

    fn range_into(
        &mut self,
        page: u32,
        query: &ComplexObject,
        radius: f64,
        hits: &mut Vec<ComplexObject>,
    ) -> IndexResult<()> {
        match self.read_node(page)? {
            Node::Leaf(objects) => {
                for object in objects {
                    let d = self.evaluator.distance(query, &object)?;
                    if d <= radius {
                        hits.push(object);
                    }
                }
            }
            Node::Branch(entries) => {
                for entry in entries {
                    let d = self.evaluator.distance(query, &entry.rep)?;
                    if d <= radius + entry.radius {
                        self.range_into(entry.child, query, radius, hits)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn nearest_into(
        &mut self,
        page: u32,
        query: &ComplexObject,
        k: usize,
        best: &mut Vec<(f64, ComplexObject)>,
    ) -> IndexResult<()> {
        match self.read_node(page)? {
            Node::Leaf(objects) => {
                for object in objects {
                    let d = self.evaluator.distance(query, &object)?;
                    if best.len() < k || d < best[best.len() - 1].0 {
                        let pos = best.partition_point(|(bd, _)| *bd <= d);
                        best.insert(pos, (d, object));
                        best.truncate(k);
                    }
                }
            }
            Node::Branch(entries) => {
                // Visit the most promising subtree first so the pruning
                // bound tightens as early as possible.
                let mut ordered = Vec::with_capacity(entries.len());
                for entry in entries {
                    let d = self.evaluator.distance(query, &entry.rep)?;
                    ordered.push((d, entry));
                }
                ordered.sort_by(|a, b| {
                    (a.0 - a.1.radius)
                        .partial_cmp(&(b.0 - b.1.radius))
                        .unwrap()
                });
                for (d, entry) in ordered {
                    let bound = if best.len() < k {
                        f64::INFINITY
                    } else {
                        best[best.len() - 1].0
                    };
                    if d - entry.radius <= bound {
                        self.nearest_into(entry.child, query, k, best)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl MetricIndex for SlimTree {
    fn insert(&mut self, object: &ComplexObject) -> IndexResult<()> {
        let needed = NODE_HEADER + object.serialized_size() + BRANCH_ENTRY_OVERHEAD;
        if needed > self.pager.page_size() {
            return Err(IndexError::Backend(format!(
                "object {:?} needs {} bytes of node space, page size is {}",
                object.label(),
                needed,
                self.pager.page_size()
            )));
        }

        match self.root {
            None => {
                let page = self.pager.allocate();
                self.write_node(page, &Node::Leaf(vec![object.clone()]))?;
                self.root = Some(page);
            }
            Some(root) => {
                if let Some((left, right)) = self.insert_into(root, object)? {
                    let new_root = self.pager.allocate();
                    self.write_node(new_root, &Node::Branch(vec![left, right]))?;
                    self.root = Some(new_root);
                }
            }
        }
        self.count += 1;
        Ok(())
    }

    fn range_query(
        &mut self,
        query: &ComplexObject,
        radius: f64,
    ) -> IndexResult<Vec<ComplexObject>> {
        let mut hits = Vec::new();
        if let Some(root) = self.root {
            self.range_into(root, query, radius, &mut hits)?;
        }
        Ok(hits)
    }

    fn nearest_query(
        &mut self,
        query: &ComplexObject,
        k: usize,
    ) -> IndexResult<Vec<ComplexObject>> {
        let mut best = Vec::new();
        if k > 0 {
            if let Some(root) = self.root {
                self.nearest_into(root, query, k, &mut best)?;
            }
        }
        Ok(best.into_iter().map(|(_, object)| object).collect())
    }

    fn object_count(&self) -> usize {
        self.count
    }

    fn reset_statistics(&mut self) {
        self.evaluator.reset_statistics();
        self.pager.reset_statistics();
    }

    fn page_reads(&self) -> u64 {
        self.pager.read_count()
    }

    fn page_writes(&self) -> u64 {
        self.pager.write_count()
    }
}
