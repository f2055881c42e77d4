//! Content-addressed hash trees with order-independent node hashes
//!
//! Every node carries a content digest and any number of children. A node's
//! hash is the canonical hash of the set made of its own content digest and
//! the hashes of its children, so reordering siblings never changes it.
//! Nodes live in an arena and are addressed by [`NodeId`], which stays the
//! identity of a node even when two subtrees hash to the same value.

use ats_types::{hash, HashAlgorithm, HashValue, PartialHashSet};

/// Opaque handle to a node, issued by the [`TreeBuilder`] that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in build order
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A nested content object used to build trees in one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub content: Vec<u8>,
    pub children: Vec<Document>,
}

impl Document {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            children: Vec::new(),
        }
    }

    /// Append a child document
    pub fn with_child(mut self, child: Document) -> Self {
        self.children.push(child);
        self
    }

    /// Append a childless document for each content item
    pub fn with_leaves<I, C>(mut self, contents: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.children.extend(contents.into_iter().map(Document::new));
        self
    }

    /// Number of documents in this subtree, including itself
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(doc) = stack.pop() {
            count += 1;
            stack.extend(doc.children.iter());
        }
        count
    }
}

/// A node of a built [`MerkleTree`]
#[derive(Debug, Clone)]
pub struct TreeNode {
    content_digest: HashValue,
    hash: HashValue,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TreeNode {
    /// Digest of the node's own content
    pub fn content_digest(&self) -> &HashValue {
        &self.content_digest
    }

    /// Node hash over the content digest and the child hashes
    pub fn hash(&self) -> &HashValue {
        &self.hash
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An immutable hash tree with every node hash computed
#[derive(Debug, Clone)]
pub struct MerkleTree {
    algorithm: HashAlgorithm,
    nodes: Vec<TreeNode>,
}

impl MerkleTree {
    /// Build a tree whose shape mirrors a nested document.
    ///
    /// Node ids are assigned in document pre-order, so the n-th document
    /// visited depth-first gets `NodeId` index n.
    pub fn from_document(document: &Document, algorithm: HashAlgorithm) -> Self {
        let mut builder = TreeBuilder::new(algorithm, &document.content);
        let root = builder.root_id();
        for child in &document.children {
            builder.add_document(root, child);
        }
        builder.build()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    pub fn root_hash(&self) -> &HashValue {
        &self.root().hash
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Distance from the root; the root has depth 0
    pub fn depth(&self, id: NodeId) -> Option<usize> {
        self.ancestors(id).map(|chain| chain.len() - 1)
    }

    /// The node itself followed by each ancestor up to and including the root
    pub fn ancestors(&self, id: NodeId) -> Option<Vec<NodeId>> {
        let mut node = self.node(id)?;
        let mut chain = vec![id];
        while let Some(parent) = node.parent {
            chain.push(parent);
            node = &self.nodes[parent.0];
        }
        Some(chain)
    }

    /// Depth-first pre-order walk, children in insertion order
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter {
            tree: self,
            stack: vec![self.root_id()],
        }
    }

    /// First node in pre-order accepted by the predicate
    pub fn find_node<P>(&self, mut predicate: P) -> Option<NodeId>
    where
        P: FnMut(&TreeNode) -> bool,
    {
        self.iter_preorder()
            .find(|(_, node)| predicate(node))
            .map(|(id, _)| id)
    }

    /// First node in pre-order whose node hash equals `hash`
    pub fn find_by_hash(&self, hash: &HashValue) -> Option<NodeId> {
        self.find_node(|node| &node.hash == hash)
    }

    /// The node's content digest together with the hashes of its children
    pub fn partial_hash_set(&self, id: NodeId) -> Option<PartialHashSet> {
        let node = self.node(id)?;
        let mut hashes = Vec::with_capacity(node.children.len() + 1);
        hashes.push(node.content_digest.clone());
        hashes.extend(node.children.iter().map(|c| self.nodes[c.0].hash.clone()));
        Some(PartialHashSet::new(hashes))
    }
}

/// Pre-order iterator over `(NodeId, &TreeNode)` pairs
pub struct PreorderIter<'a> {
    tree: &'a MerkleTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = (NodeId, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = &self.tree.nodes[id.0];
        self.stack.extend(node.children.iter().rev().copied());
        Some((id, node))
    }
}

struct PendingNode {
    content_digest: HashValue,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Builder for constructing hash trees node by node
pub struct TreeBuilder {
    algorithm: HashAlgorithm,
    nodes: Vec<PendingNode>,
}

impl TreeBuilder {
    /// Start a tree with the given root content
    pub fn new(algorithm: HashAlgorithm, root_content: &[u8]) -> Self {
        Self {
            algorithm,
            nodes: vec![PendingNode {
                content_digest: hash::digest(root_content, algorithm),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    /// Add a node below `parent` and return its id.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was not issued by this builder.
    pub fn add_child(&mut self, parent: NodeId, content: &[u8]) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PendingNode {
            content_digest: hash::digest(content, self.algorithm),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Add a whole document subtree below `parent` and return the id of the
    /// document's own node. Ids are handed out in document pre-order.
    pub fn add_document(&mut self, parent: NodeId, document: &Document) -> NodeId {
        let top = self.add_child(parent, &document.content);
        let mut stack: Vec<(NodeId, &Document)> =
            document.children.iter().rev().map(|child| (top, child)).collect();
        while let Some((parent, doc)) = stack.pop() {
            let id = self.add_child(parent, &doc.content);
            stack.extend(doc.children.iter().rev().map(|child| (id, child)));
        }
        top
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Compute every node hash and freeze the tree
    pub fn build(self) -> MerkleTree {
        let algorithm = self.algorithm;
        let count = self.nodes.len();

        // Filled from the last id down, so `reversed[count - 1 - id]` holds
        // the hash of node `id`. A child id is always larger than its
        // parent's, so its hash is present before the parent is reached;
        // a violation indexes past the end and panics.
        let mut reversed: Vec<HashValue> = Vec::with_capacity(count);
        for (index, node) in self.nodes.iter().enumerate().rev() {
            let mut set = Vec::with_capacity(node.children.len() + 1);
            set.push(node.content_digest.clone());
            for child in &node.children {
                debug_assert!(child.0 > index, "child {} precedes parent {}", child.0, index);
                set.push(reversed[count - 1 - child.0].clone());
            }
            reversed.push(hash::canonical_hash(&set, algorithm));
        }

        let nodes = self
            .nodes
            .into_iter()
            .zip(reversed.into_iter().rev())
            .map(|(pending, hash)| TreeNode {
                content_digest: pending.content_digest,
                hash,
                parent: pending.parent,
                children: pending.children,
            })
            .collect();

        MerkleTree { algorithm, nodes }
    }
}
