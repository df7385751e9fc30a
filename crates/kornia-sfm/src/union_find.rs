use std::{collections::HashMap, hash::Hash};

/// Disjoint sets over the element indices `0..len`, merged by size.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    /// Create `len` singleton sets.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    /// Add a singleton set and return its element.
    pub fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.size.push(1);
        id
    }

    /// Root of the set of `id`.
    ///
    /// Every visited element is re-pointed to its grandparent, halving the path.
    pub fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            let grandparent = self.parent[self.parent[id]];
            self.parent[id] = grandparent;
            id = grandparent;
        }
        id
    }

    /// Merge the sets of `a` and `b` and return the root of the merged set.
    ///
    /// The smaller set goes under the larger one, `b`'s root on ties.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let (mut small, mut large) = (self.find(a), self.find(b));
        if small == large {
            return large;
        }
        if self.size[small] > self.size[large] {
            std::mem::swap(&mut small, &mut large);
        }
        self.parent[small] = large;
        self.size[large] += self.size[small];
        large
    }

    /// Number of elements in the set of `id`.
    pub fn set_size(&mut self, id: usize) -> usize {
        let root = self.find(id);
        self.size[root]
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether there is no element.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}

/// A [`UnionFind`] over arbitrary hashable keys.
///
/// Keys are assigned arena indices in insertion order, and [`KeyedUnionFind::sets`]
/// enumerates the equivalence classes in the order their first member was inserted,
/// members listed in insertion order as well.
#[derive(Debug, Clone)]
pub struct KeyedUnionFind<K> {
    index: HashMap<K, usize>,
    keys: Vec<K>,
    arena: UnionFind,
}

impl<K: Hash + Eq + Clone> Default for KeyedUnionFind<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> KeyedUnionFind<K> {
    /// Creates an empty structure.
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
            arena: UnionFind::default(),
        }
    }

    /// Returns the arena index of `key`, inserting it as a singleton if unseen.
    pub fn insert(&mut self, key: K) -> usize {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.arena.push();
        self.index.insert(key.clone(), id);
        self.keys.push(key);
        id
    }

    /// Unites the classes of `a` and `b`, inserting either key if unseen.
    pub fn union(&mut self, a: K, b: K) {
        let aid = self.insert(a);
        let bid = self.insert(b);
        self.arena.union(aid, bid);
    }

    /// Returns true if both keys are known and belong to the same class.
    pub fn connected(&mut self, a: &K, b: &K) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(aid), Some(bid)) => self.arena.find(aid) == self.arena.find(bid),
            _ => false,
        }
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no key was inserted.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Materializes the equivalence classes.
    pub fn sets(&mut self) -> Vec<Vec<K>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut sets: Vec<Vec<K>> = Vec::new();
        for (id, key) in self.keys.iter().enumerate() {
            let root = self.arena.find(id);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                sets.push(Vec::new());
                sets.len() - 1
            });
            sets[slot].push(key.clone());
        }
        sets
    }
}
