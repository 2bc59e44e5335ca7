//! Owned, mutable XML tree.
//!
//! `roxmltree` gives a read-only view, so parts that get edited are copied into
//! an arena. Children lists own the structure; each node also records its parent
//! so lookups can walk upwards. Moving a node is always `detach` followed by
//! `append_child` or `insert_before`.

use crate::error::Error;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl QName {
    fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    pub name: QName,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Root,
    Element {
        name: QName,
        /// Namespace declarations made on this element: (prefix, uri).
        namespaces: Vec<(Option<String>, String)>,
        attrs: Vec<Attr>,
    },
    Text(String),
    Comment(String),
    Pi {
        target: String,
        value: Option<String>,
    },
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct XmlTree {
    nodes: Vec<Node>,
}

impl XmlTree {
    pub fn parse(text: &str) -> Result<XmlTree, Error> {
        let source = roxmltree::Document::parse(text)?;
        let mut tree = XmlTree {
            nodes: vec![Node { kind: NodeKind::Root, parent: None, children: Vec::new() }],
        };
        let root = tree.document();
        for child in source.root().children() {
            tree.import(child, root);
        }
        Ok(tree)
    }

    pub fn parse_bytes(bytes: &[u8]) -> Result<XmlTree, Error> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Structure(format!("XML part is not UTF-8: {e}")))?;
        XmlTree::parse(text.strip_prefix('\u{feff}').unwrap_or(text))
    }

    fn import(&mut self, node: roxmltree::Node, parent: NodeId) {
        let kind = if node.is_element() {
            let tag = node.tag_name();
            let name = qname(node, tag.namespace(), tag.name());
            let parent_scope: Vec<(Option<String>, String)> = node
                .parent_element()
                .map(|p| p.namespaces().map(owned_namespace).collect())
                .unwrap_or_default();
            let namespaces = node
                .namespaces()
                .map(owned_namespace)
                .filter(|ns| ns.0.as_deref() != Some("xml"))
                .filter(|ns| !parent_scope.contains(ns))
                .collect();
            let attrs = node
                .attributes()
                .map(|a| Attr {
                    name: qname(node, a.namespace(), a.name()),
                    value: a.value().to_string(),
                })
                .collect();
            NodeKind::Element { name, namespaces, attrs }
        } else if node.is_text() {
            NodeKind::Text(node.text().unwrap_or_default().to_string())
        } else if node.is_comment() {
            NodeKind::Comment(node.text().unwrap_or_default().to_string())
        } else if let Some(pi) = node.pi() {
            NodeKind::Pi { target: pi.target.to_string(), value: pi.value.map(str::to_string) }
        } else {
            return;
        };

        let id = self.push(kind);
        self.link(parent, id);
        for child in node.children() {
            self.import(child, id);
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node { kind, parent: None, children: Vec::new() });
        NodeId(self.nodes.len() - 1)
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// The document node, parent of the root element.
    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.document())
            .iter()
            .copied()
            .find(|&id| matches!(self.nodes[id.0].kind, NodeKind::Element { .. }))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is(&self, id: NodeId, ns: &str, local: &str) -> bool {
        self.name(id)
            .is_some_and(|n| n.local == local && n.namespace.as_deref() == Some(ns))
    }

    pub fn find_child(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.is(c, ns, local))
    }

    pub fn child_elements<'a>(
        &'a self,
        id: NodeId,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id).iter().copied().filter(move |&c| self.is(c, ns, local))
    }

    /// Every node below `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn find_descendant(&self, id: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.descendants(id).into_iter().find(|&d| self.is(d, ns, local))
    }

    /// Whether `id` is still reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.document()
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: String) {
        if let NodeKind::Text(t) = &mut self.nodes[id.0].kind {
            *t = value;
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id).into_iter().filter_map(|d| self.text(d)).collect()
    }

    pub fn attr(&self, id: NodeId, local: &str) -> Option<&str> {
        self.find_attr(id, None, local)
    }

    pub fn attr_ns(&self, id: NodeId, ns: &str, local: &str) -> Option<&str> {
        self.find_attr(id, Some(ns), local)
    }

    fn find_attr(&self, id: NodeId, ns: Option<&str>, local: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.local == local && a.name.namespace.as_deref() == ns)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, local: &str, value: impl Into<String>) {
        let name = QName { prefix: None, local: local.to_string(), namespace: None };
        self.store_attr(id, name, value.into());
    }

    pub fn set_attr_ns(
        &mut self,
        id: NodeId,
        ns: &str,
        preferred_prefix: &str,
        local: &str,
        value: impl Into<String>,
    ) {
        let prefix = self.ensure_namespace(ns, preferred_prefix);
        let name = QName { prefix, local: local.to_string(), namespace: Some(ns.to_string()) };
        self.store_attr(id, name, value.into());
    }

    fn store_attr(&mut self, id: NodeId, name: QName, value: String) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            match attrs
                .iter_mut()
                .find(|a| a.name.local == name.local && a.name.namespace == name.namespace)
            {
                Some(existing) => existing.value = value,
                None => attrs.push(Attr { name, value }),
            }
        }
    }

    /// Prefix bound to `uri` on the root element, declaring it there when absent.
    pub fn ensure_namespace(&mut self, uri: &str, preferred_prefix: &str) -> Option<String> {
        let root = self.root_element()?;
        let NodeKind::Element { namespaces, .. } = &mut self.nodes[root.0].kind else {
            return None;
        };
        if let Some((prefix, _)) = namespaces.iter().find(|(_, u)| u == uri) {
            return prefix.clone();
        }
        if preferred_prefix.is_empty() && !namespaces.iter().any(|(p, _)| p.is_none()) {
            namespaces.push((None, uri.to_string()));
            return None;
        }
        let preferred_prefix = if preferred_prefix.is_empty() { "ns" } else { preferred_prefix };
        let mut prefix = preferred_prefix.to_string();
        let mut n = 1;
        while namespaces.iter().any(|(p, _)| p.as_deref() == Some(prefix.as_str())) {
            prefix = format!("{preferred_prefix}{n}");
            n += 1;
        }
        namespaces.push((Some(prefix.clone()), uri.to_string()));
        Some(prefix)
    }

    /// A detached element; attach it with `append_child` or `insert_before`.
    pub fn create_element(&mut self, ns: &str, preferred_prefix: &str, local: &str) -> NodeId {
        let prefix = self.ensure_namespace(ns, preferred_prefix);
        self.push(NodeKind::Element {
            name: QName { prefix, local: local.to_string(), namespace: Some(ns.to_string()) },
            namespaces: Vec::new(),
            attrs: Vec::new(),
        })
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        ns: &str,
        preferred_prefix: &str,
        local: &str,
    ) -> Result<NodeId, Error> {
        let id = self.create_element(ns, preferred_prefix, local);
        self.append_child(parent, id)?;
        Ok(id)
    }

    pub fn create_text(&mut self, value: &str) -> NodeId {
        self.push(NodeKind::Text(value.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        self.check_attachable(parent, child)?;
        self.link(parent, child);
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        reference: NodeId,
        child: NodeId,
    ) -> Result<(), Error> {
        self.check_attachable(parent, child)?;
        let index = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .ok_or_else(|| Error::Structure("reference node is not a child of parent".into()))?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        Ok(())
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        if self.parent(child).is_some() {
            return Err(Error::Structure("node is already attached; detach it first".into()));
        }
        let mut current = Some(parent);
        while let Some(node) = current {
            if node == child {
                return Err(Error::Structure("cannot attach a node below itself".into()));
            }
            current = self.parent(node);
        }
        Ok(())
    }

    /// Unlinks `id` from its parent. The node and its subtree stay usable.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::from(XML_DECLARATION);
        for &child in self.children(self.document()) {
            self.write_node(child, &mut out);
        }
        out.into_bytes()
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Root => {}
            NodeKind::Text(t) => escape_into(t, false, out),
            NodeKind::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            NodeKind::Pi { target, value } => {
                out.push_str("<?");
                out.push_str(target);
                if let Some(v) = value {
                    out.push(' ');
                    out.push_str(v);
                }
                out.push_str("?>");
            }
            NodeKind::Element { name, namespaces, attrs } => {
                let qualified = name.qualified();
                out.push('<');
                out.push_str(&qualified);
                for (prefix, uri) in namespaces {
                    match prefix {
                        Some(p) => {
                            out.push_str(" xmlns:");
                            out.push_str(p);
                        }
                        None => out.push_str(" xmlns"),
                    }
                    out.push_str("=\"");
                    escape_into(uri, true, out);
                    out.push('"');
                }
                for attr in attrs {
                    out.push(' ');
                    match (&attr.name.prefix, attr.name.namespace.as_deref()) {
                        (Some(_), _) => out.push_str(&attr.name.qualified()),
                        (None, Some(XML_NS)) => {
                            out.push_str("xml:");
                            out.push_str(&attr.name.local);
                        }
                        (None, _) => out.push_str(&attr.name.local),
                    }
                    out.push_str("=\"");
                    escape_into(&attr.value, true, out);
                    out.push('"');
                }
                let children = self.children(id);
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&qualified);
                    out.push('>');
                }
            }
        }
    }
}

fn qname(node: roxmltree::Node, ns: Option<&str>, local: &str) -> QName {
    let prefix = ns
        .and_then(|uri| node.lookup_prefix(uri))
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    QName { prefix, local: local.to_string(), namespace: ns.map(str::to_string) }
}

fn owned_namespace(ns: &roxmltree::Namespace) -> (Option<String>, String) {
    (ns.name().map(str::to_string), ns.uri().to_string())
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}
