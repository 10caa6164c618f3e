//! Mutable HTML document
//!
//! `scraper` parses into an `ego_tree` arena; nodes are addressed by
//! `NodeId` and stay valid across edits. Removed nodes become orphans in the
//! arena and are never reached from the root again, so every query here
//! starts from the root element rather than scanning the arena.

use ego_tree::{NodeId, NodeRef};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use thiserror::Error;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A CSS selector that failed to parse
#[derive(Debug, Error)]
#[error("invalid selector {selector:?}: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// Parses a CSS selector, keeping the offending text in the error
pub fn parse_selector(css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError {
        selector: css.to_string(),
        reason: format!("{:?}", e),
    })
}

/// An HTML document that can be queried and edited in place
#[derive(Debug)]
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Serializes the whole document
    pub fn html(&self) -> String {
        self.html.html()
    }

    pub fn root_element(&self) -> NodeId {
        self.html.root_element().id()
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id)
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.node(id).and_then(ElementRef::wrap)
    }

    /// Every element matching the selector, in document order
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        let root = self.html.root_element();
        let mut found = Vec::new();
        if selector.matches(&root) {
            found.push(root.id());
        }
        found.extend(root.select(selector).map(|e| e.id()));
        found
    }

    /// Elements matching `selector` below any element matching `container`
    ///
    /// Results are deduplicated when containers nest.
    pub fn select_within(&self, container: &Selector, selector: &Selector) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for id in self.select(container) {
            let Some(scope) = self.element(id) else {
                continue;
            };
            for element in scope.select(selector) {
                if element.id() != id && seen.insert(element.id()) {
                    found.push(element.id());
                }
            }
        }
        found
    }

    /// First match of the selector
    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        let root = self.html.root_element();
        if selector.matches(&root) {
            return Some(root.id());
        }
        root.select(selector).next().map(|e| e.id())
    }

    /// Concatenated text of an element's descendants
    pub fn text(&self, id: NodeId) -> String {
        self.element(id)
            .map(|e| e.text().collect())
            .unwrap_or_default()
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        self.element(id).map(|e| e.inner_html()).unwrap_or_default()
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        self.element(id).map(|e| e.html()).unwrap_or_default()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.value().as_element()?.attr(name)
    }

    /// Local tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value().as_element().map(|e| e.name())
    }

    /// Content of a text node
    pub fn text_value(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value().as_text().map(|t| &**t)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).map_or(false, |n| n.value().is_element())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent().map(|p| p.id())
    }

    /// Parent, if it is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?
            .parent()
            .filter(|p| p.value().is_element())
            .map(|p| p.id())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.next_sibling().map(|n| n.id())
    }

    /// Next sibling that is an element, skipping text and comments
    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?
            .next_siblings()
            .find(|n| n.value().is_element())
            .map(|n| n.id())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    /// All descendants of a node, in document order, excluding the node
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.descendants().skip(1).map(|d| d.id()).collect())
            .unwrap_or_default()
    }

    /// Returns true if the node is still reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.node(id) {
            Some(node) => node.id() == root || node.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    // ===== Mutation =====

    // Nodes without a parent (detached, or the tree root) cannot take
    // siblings; edits that would need one are ignored.

    /// Detaches a node and its subtree
    pub fn remove(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Replaces a node with its own children
    pub fn unwrap(&mut self, id: NodeId) {
        if self.parent(id).is_none() {
            return;
        }
        for child in self.children(id) {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.insert_id_before(child);
            }
        }
        self.remove(id);
    }

    /// Replaces the parent of a node with the parent's children
    pub fn unwrap_parent(&mut self, id: NodeId) {
        if let Some(parent) = self.parent_element(id) {
            self.unwrap(parent);
        }
    }

    /// Replaces a node with parsed HTML
    pub fn replace_with_html(&mut self, id: NodeId, html: &str) {
        self.insert_html_before(id, html);
        self.remove(id);
    }

    /// Inserts parsed HTML as preceding siblings of a node
    pub fn insert_html_before(&mut self, id: NodeId, html: &str) {
        if self.parent(id).is_none() {
            return;
        }
        for new in self.import_fragment(html) {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.insert_id_before(new);
            }
        }
    }

    /// Appends parsed HTML as the last children of a node
    pub fn append_html(&mut self, id: NodeId, html: &str) {
        for new in self.import_fragment(html) {
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append_id(new);
            }
        }
    }

    /// Wraps a node in a copy of the HTML structure
    ///
    /// The node ends up inside the structure's deepest first element.
    pub fn wrap(&mut self, id: NodeId, html: &str) {
        if self.parent(id).is_none() {
            return;
        }
        let Some((outer, inner)) = self.build_wrapper(html) else {
            return;
        };
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.insert_id_before(outer);
        }
        if let Some(mut inner) = self.html.tree.get_mut(inner) {
            inner.append_id(id);
        }
    }

    /// Wraps all nodes in a single copy of the HTML structure, placed where
    /// the first node was
    ///
    /// A node nested inside another target moves with that target.
    pub fn wrap_all(&mut self, ids: &[NodeId], html: &str) {
        let targets: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| {
                self.node(*id)
                    .map_or(false, |n| !n.ancestors().any(|a| ids.contains(&a.id())))
            })
            .collect();
        let Some(first) = targets.first().copied() else {
            return;
        };
        if self.parent(first).is_none() {
            return;
        }
        let Some((outer, inner)) = self.build_wrapper(html) else {
            return;
        };
        if let Some(mut node) = self.html.tree.get_mut(first) {
            node.insert_id_before(outer);
        }
        for id in targets {
            if let Some(mut inner) = self.html.tree.get_mut(inner) {
                inner.append_id(id);
            }
        }
    }

    /// Wraps the children of a node in a copy of the HTML structure
    pub fn wrap_inner(&mut self, id: NodeId, html: &str) {
        let Some((outer, inner)) = self.build_wrapper(html) else {
            return;
        };
        for child in self.children(id) {
            if let Some(mut inner) = self.html.tree.get_mut(inner) {
                inner.append_id(child);
            }
        }
        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.append_id(outer);
        }
    }

    /// Sets an attribute, replacing any existing value
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.rebuild_element(id, |attrs| {
            attrs.retain(|a| &*a.name.local != name);
            attrs.push(attribute(name, value));
        });
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.rebuild_element(id, |attrs| attrs.retain(|a| &*a.name.local != name));
    }

    /// Replaces the content of a text node
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(mut node) = self.html.tree.get_mut(id) {
            if node.value().is_text() {
                *node.value() = Node::Text(Text {
                    text: StrTendril::from_slice(text),
                });
            }
        }
    }

    /// Text nodes below a node, in document order
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| {
                n.descendants()
                    .filter(|d| d.value().is_text())
                    .map(|d| d.id())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn rebuild_element(&mut self, id: NodeId, edit: impl FnOnce(&mut Vec<Attribute>)) {
        let Some(mut node) = self.html.tree.get_mut(id) else {
            return;
        };
        let rebuilt = match node.value() {
            Node::Element(element) => {
                let mut attrs: Vec<Attribute> = element
                    .attrs()
                    .map(|(name, value)| attribute(name, value))
                    .collect();
                edit(&mut attrs);
                let name = QualName::new(
                    None,
                    Namespace::from(HTML_NAMESPACE),
                    LocalName::from(element.name()),
                );
                Some(Element::new(name, attrs))
            }
            _ => None,
        };
        if let Some(element) = rebuilt {
            *node.value() = Node::Element(element);
        }
    }

    /// Parses an HTML fragment and copies its top-level nodes into this
    /// document's arena as orphans
    fn import_fragment(&mut self, html: &str) -> Vec<NodeId> {
        let fragment = Html::parse_fragment(html);
        let root = fragment.root_element();
        root.children()
            .map(|child| self.copy_subtree(child))
            .collect()
    }

    fn copy_subtree(&mut self, source: NodeRef<'_, Node>) -> NodeId {
        let id = self.html.tree.orphan(source.value().clone()).id();
        for child in source.children() {
            let copied = self.copy_subtree(child);
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.append_id(copied);
            }
        }
        id
    }

    /// Imports a wrapping structure, returning its outermost element and the
    /// deepest first element inside it
    fn build_wrapper(&mut self, html: &str) -> Option<(NodeId, NodeId)> {
        let outer = self
            .import_fragment(html)
            .into_iter()
            .find(|id| self.is_element(*id))?;

        let mut inner = outer;
        while let Some(next) = self
            .children(inner)
            .into_iter()
            .find(|id| self.is_element(*id))
        {
            inner = next;
        }
        Some((outer, inner))
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from_slice(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse(&format!(
            "<html><head><title>t</title></head><body>{}</body></html>",
            body
        ))
    }

    fn sel(css: &str) -> Selector {
        parse_selector(css).unwrap()
    }

    fn body_html(doc: &Document) -> String {
        let body = doc.select_first(&sel("body")).unwrap();
        doc.inner_html(body)
    }

    #[test]
    fn test_parse_selector_error() {
        let err = parse_selector("p[").unwrap_err();
        assert_eq!(err.selector, "p[");
    }

    #[test]
    fn test_select_and_text() {
        let d = doc("<p>one</p><div><p>two <b>three</b></p></div>");
        let ps = d.select(&sel("p"));
        assert_eq!(ps.len(), 2);
        assert_eq!(d.text(ps[1]), "two three");
        assert_eq!(d.tag_name(ps[0]), Some("p"));
    }

    #[test]
    fn test_select_within_scope() {
        let d = doc("<p>out</p><div class=\"c\"><p>in</p></div>");
        let found = d.select_within(&sel("div.c"), &sel("p"));
        assert_eq!(found.len(), 1);
        assert_eq!(d.text(found[0]), "in");
    }

    #[test]
    fn test_removed_nodes_are_not_selected() {
        let mut d = doc("<p class=\"x\">a</p><p>b</p>");
        let x = d.select_first(&sel("p.x")).unwrap();
        d.remove(x);
        assert!(!d.is_attached(x));
        assert!(d.select(&sel("p.x")).is_empty());
        assert_eq!(body_html(&d), "<p>b</p>");
    }

    #[test]
    fn test_unwrap_parent() {
        let mut d = doc("<div><span>a</span><i>b</i></div>");
        let span = d.select_first(&sel("span")).unwrap();
        d.unwrap_parent(span);
        assert_eq!(body_html(&d), "<span>a</span><i>b</i>");
    }

    #[test]
    fn test_replace_with_html() {
        let mut d = doc("<p>a</p><p class=\"r\">b</p>");
        let r = d.select_first(&sel("p.r")).unwrap();
        d.replace_with_html(r, "<hr>");
        assert_eq!(body_html(&d), "<p>a</p><hr>");
    }

    #[test]
    fn test_insert_before_and_append() {
        let mut d = doc("<p>a</p>");
        let p = d.select_first(&sel("p")).unwrap();
        d.insert_html_before(p, "<h3>x</h3>");
        d.append_html(p, "<br>");
        assert_eq!(body_html(&d), "<h3>x</h3><p>a<br></p>");
    }

    #[test]
    fn test_wrap() {
        let mut d = doc("<p>a</p><p>b</p>");
        let ps = d.select(&sel("p"));
        d.wrap(ps[0], "<blockquote><div></div></blockquote>");
        assert_eq!(
            body_html(&d),
            "<blockquote><div><p>a</p></div></blockquote><p>b</p>"
        );
    }

    #[test]
    fn test_wrap_all() {
        let mut d = doc("<h1>t</h1><p>a</p><p>b</p>");
        let ps = d.select(&sel("p"));
        d.wrap_all(&ps, "<div class=\"letter\"></div>");
        assert_eq!(
            body_html(&d),
            "<h1>t</h1><div class=\"letter\"><p>a</p><p>b</p></div>"
        );
    }

    #[test]
    fn test_wrap_all_nested_targets() {
        let mut d = doc("<div><p>a</p></div><p>b</p>");
        let div = d.select_first(&sel("div")).unwrap();
        let ps = d.select(&sel("p"));
        // Inner paragraph first, then its ancestor
        d.wrap_all(&[ps[0], div, ps[1]], "<section></section>");
        assert_eq!(
            body_html(&d),
            "<section><div><p>a</p></div><p>b</p></section>"
        );
    }

    #[test]
    fn test_wrap_inner() {
        let mut d = doc("<p>a <b>b</b></p>");
        let p = d.select_first(&sel("p")).unwrap();
        d.wrap_inner(p, "<em></em>");
        assert_eq!(body_html(&d), "<p><em>a <b>b</b></em></p>");
    }

    #[test]
    fn test_set_and_remove_attr() {
        let mut d = doc("<p style=\"color: red\" class=\"c\">a</p>");
        let p = d.select_first(&sel("p")).unwrap();

        d.remove_attr(p, "style");
        assert_eq!(d.attr(p, "style"), None);
        assert_eq!(d.attr(p, "class"), Some("c"));

        d.set_attr(p, "class", "lyrics");
        assert_eq!(d.attr(p, "class"), Some("lyrics"));
        assert_eq!(d.select(&sel("p.lyrics")), vec![p]);
    }

    #[test]
    fn test_set_text() {
        let mut d = doc("<p>teh cat</p>");
        let p = d.select_first(&sel("p")).unwrap();
        let t = d.text_nodes(p)[0];
        d.set_text(t, "the cat");
        assert_eq!(d.text(p), "the cat");
        assert_eq!(d.text_value(t), Some("the cat"));
    }

    #[test]
    fn test_edits_on_detached_nodes_are_ignored() {
        let mut d = doc("<div><p>a</p></div>");
        let div = d.select_first(&sel("div")).unwrap();
        let p = d.select_first(&sel("p")).unwrap();
        d.remove(div);
        d.replace_with_html(div, "<hr>");
        d.unwrap_parent(p);
        assert_eq!(body_html(&d), "");
    }

    #[test]
    fn test_navigation() {
        let d = doc("<div><p>a</p> text <p>b</p></div>");
        let ps = d.select(&sel("p"));
        let div = d.select_first(&sel("div")).unwrap();
        assert_eq!(d.parent_element(ps[0]), Some(div));
        assert_eq!(d.next_element_sibling(ps[0]), Some(ps[1]));
        assert_eq!(d.next_element_sibling(ps[1]), None);
        assert_eq!(d.children(div).len(), 3);
    }
}
