use std::fmt;

/// Index of a node inside its [`Tree`] arena.
///
/// Ids are assigned in document order while the tree is built, so comparing
/// two ids of the same tree compares their document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One element of a parsed AST
#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<NodeId>,
    /// Non-owning back link. `None` only for the document node.
    pub parent: Option<NodeId>,
    /// 1-based line of the start tag in the serialized XML
    pub source_line: u32,
    /// Character data directly inside this element
    pub text: String,
}

/// Arena-allocated syntax tree of one source file.
///
/// Index 0 always holds a synthetic document node (empty tag); the AST's
/// root element is its only child.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// The synthetic document node that XPath `/` refers to
    #[inline]
    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    /// The document element, if any
    pub fn root(&self) -> Option<NodeId> {
        self.nodes[0].children.first().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn is_document(&self, id: NodeId) -> bool {
        id.0 == 0
    }

    #[inline]
    pub fn tag(&self, id: NodeId) -> &str {
        &self.node(id).tag
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    #[inline]
    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).children.get(index).copied()
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    #[inline]
    pub fn source_line(&self, id: NodeId) -> u32 {
        self.node(id).source_line
    }

    /// Logical line declared by the AST (`line` attribute), defaulting to 1
    pub fn line(&self, id: NodeId) -> u32 {
        self.attribute(id, "line")
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(1)
    }

    /// Proper ancestors, nearest first, excluding the document node
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Proper descendants in document order
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        // Pre-order ids are contiguous: the subtree of `id` ends where the
        // next non-descendant begins.
        let end = self.subtree_end(id);
        (id.index() + 1..end).map(NodeId::from_index)
    }

    /// Siblings after `id` in document order
    pub fn following_siblings(&self, id: NodeId) -> &[NodeId] {
        match self.sibling_position(id) {
            Some((siblings, pos)) => &siblings[pos + 1..],
            None => &[],
        }
    }

    /// Siblings before `id` in document order (not reversed)
    pub fn preceding_siblings(&self, id: NodeId) -> &[NodeId] {
        match self.sibling_position(id) {
            Some((siblings, pos)) => &siblings[..pos],
            None => &[],
        }
    }

    /// Nodes after the end of `id`'s subtree, in document order
    pub fn following(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (self.subtree_end(id)..self.nodes.len()).map(NodeId::from_index)
    }

    /// Nodes that end before `id` starts and are not its ancestors, in document order
    pub fn preceding(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        (1..id.index())
            .map(NodeId::from_index)
            .filter(move |&n| self.subtree_end(n) <= id.index())
    }

    /// XPath string-value: concatenated text of the element and its descendants
    pub fn string_value(&self, id: NodeId) -> String {
        let mut out = self.node(id).text.clone();
        for desc in self.descendants(id) {
            out.push_str(&self.node(desc).text);
        }
        out
    }

    fn sibling_position(&self, id: NodeId) -> Option<(&[NodeId], usize)> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == id)?;
        Some((siblings, pos))
    }

    fn subtree_end(&self, id: NodeId) -> usize {
        let mut current = id;
        loop {
            if let Some(&next) = self.following_siblings(current).first() {
                return next.index();
            }
            match self.parent(current) {
                Some(parent) if !self.is_document(parent) => current = parent,
                _ => return self.nodes.len(),
            }
        }
    }
}

/// Iterator over a node's ancestors
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        if self.tree.is_document(current) {
            self.next = None;
            return None;
        }
        self.next = self.tree.parent(current);
        Some(current)
    }
}

/// Incremental pre-order builder for [`Tree`]
///
/// ```
/// use mcbench::tree::TreeBuilder;
///
/// let mut builder = TreeBuilder::new();
/// builder.open("ForStmt", &[("line", "3")], 3);
/// builder.leaf("AssignStmt", &[], 4);
/// builder.close();
/// let tree = builder.finish();
/// assert_eq!(tree.tag(tree.root().unwrap()), "ForStmt");
/// ```
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    stack: Vec<NodeId>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let document = Node {
            tag: String::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
            source_line: 1,
            text: String::new(),
        };
        Self {
            nodes: vec![document],
            stack: vec![NodeId(0)],
        }
    }

    /// Open an element as the last child of the current element
    pub fn open(&mut self, tag: &str, attributes: &[(&str, &str)], source_line: u32) -> NodeId {
        let attributes = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.open_owned(tag.to_string(), attributes, source_line)
    }

    pub(crate) fn open_owned(
        &mut self,
        tag: String,
        attributes: Vec<(String, String)>,
        source_line: u32,
    ) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        let parent = self.current();
        self.nodes.push(Node {
            tag,
            attributes,
            children: Vec::new(),
            parent: Some(parent),
            source_line,
            text: String::new(),
        });
        self.nodes[parent.index()].children.push(id);
        self.stack.push(id);
        id
    }

    /// Add a childless element
    pub fn leaf(&mut self, tag: &str, attributes: &[(&str, &str)], source_line: u32) -> NodeId {
        let id = self.open(tag, attributes, source_line);
        self.close();
        id
    }

    /// Append character data to the current element
    pub fn text(&mut self, text: &str) {
        let current = self.current();
        self.nodes[current.index()].text.push_str(text);
    }

    /// Close the current element. Closing at the document level is a no-op.
    pub fn close(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Number of elements still open
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    pub fn finish(self) -> Tree {
        Tree { nodes: self.nodes }
    }

    fn current(&self) -> NodeId {
        *self.stack.last().unwrap_or(&NodeId(0))
    }
}
