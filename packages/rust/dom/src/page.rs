//! Live document wrapper: a parsed HTML page that the render step can mutate.
//!
//! Reads go through `scraper` selectors. Writes go straight to the
//! underlying `ego_tree` tree: new nodes are parsed as an HTML fragment and
//! grafted under the target, attribute changes replace the element node.

use ego_tree::{NodeId, NodeRef, Tree};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::trace;
use url::Url;

use coursefeedback_shared::{CourseFeedbackError, Result};

/// A parsed page plus the URL it was served from.
pub struct HtmlPage {
    doc: Html,
    url: Url,
}

impl HtmlPage {
    /// Parse a full HTML document served from `url`.
    pub fn parse(html: &str, url: Url) -> Self {
        Self {
            doc: Html::parse_document(html),
            url,
        }
    }

    /// Replace the whole document, keeping the page URL (a navigation or full re-render).
    pub fn replace_document(&mut self, html: &str) {
        self.doc = Html::parse_document(html);
    }

    /// The parsed document.
    pub fn document(&self) -> &Html {
        &self.doc
    }

    /// The URL the page was loaded from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Serialize the current document back to HTML.
    pub fn to_html(&self) -> String {
        self.doc.html()
    }

    /// Look up an element by node id.
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.doc.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Whether any strict descendant of `container` matches `selector`.
    pub fn contains(&self, container: NodeId, selector: &Selector) -> bool {
        self.element(container)
            .map(|el| el.select(selector).any(|found| found.id() != container))
            .unwrap_or(false)
    }

    /// Parse `markup` as an HTML fragment and append its nodes as the last
    /// children of `parent`.
    pub fn append_fragment(&mut self, parent: NodeId, markup: &str) -> Result<()> {
        if self.element(parent).is_none() {
            return Err(CourseFeedbackError::Dom(format!(
                "append target {parent:?} is not an element"
            )));
        }

        let fragment = Html::parse_fragment(markup);
        let source = fragment.root_element();
        graft(&mut self.doc.tree, parent, *source)?;

        trace!(?parent, bytes = markup.len(), "appended fragment");
        Ok(())
    }

    /// Merge CSS declarations into the element's inline `style` attribute.
    ///
    /// Properties already present are overwritten; the rest of the element's
    /// attributes and all of its children are kept.
    pub fn merge_style(&mut self, target: NodeId, declarations: &[(&str, &str)]) -> Result<()> {
        let (name, attrs) = {
            let el = self.element(target).ok_or_else(|| {
                CourseFeedbackError::Dom(format!("style target {target:?} is not an element"))
            })?;
            let attrs: Vec<(String, String)> = el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (el.value().name().to_string(), attrs)
        };

        let existing = attrs
            .iter()
            .find(|(k, _)| k == "style")
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        let style = merge_declarations(existing, declarations);

        let mut open_tag = format!("<{name}");
        for (key, value) in attrs.iter().filter(|(k, _)| k != "style") {
            open_tag.push_str(&format!(r#" {key}="{}""#, escape_html(value)));
        }
        open_tag.push_str(&format!(r#" style="{}">"#, escape_html(&style)));
        let element_markup = format!("{open_tag}</{name}>");

        let replacement = rebuild_element(&name, &element_markup)?;
        let mut node = self
            .doc
            .tree
            .get_mut(target)
            .ok_or_else(|| CourseFeedbackError::Dom(format!("node {target:?} vanished")))?;
        *node.value() = Node::Element(replacement);

        trace!(?target, %style, "merged container style");
        Ok(())
    }
}

/// Copy `source`'s children (recursively) under `parent`.
fn graft(tree: &mut Tree<Node>, parent: NodeId, source: NodeRef<'_, Node>) -> Result<()> {
    for child in source.children() {
        let mut node = tree
            .get_mut(parent)
            .ok_or_else(|| CourseFeedbackError::Dom(format!("node {parent:?} vanished")))?;
        let id = node.append(child.value().clone()).id();
        graft(tree, id, child)?;
    }
    Ok(())
}

/// Parse a lone element in a context where the HTML parser keeps it, and
/// return a copy of its node value.
fn rebuild_element(name: &str, element_markup: &str) -> Result<scraper::node::Element> {
    let wrapped = match name {
        "td" | "th" => format!("<table><tbody><tr>{element_markup}</tr></tbody></table>"),
        "tr" => format!("<table><tbody>{element_markup}</tbody></table>"),
        "tbody" | "thead" | "tfoot" => format!("<table>{element_markup}</table>"),
        _ => element_markup.to_string(),
    };

    let selector = Selector::parse(name)
        .map_err(|e| CourseFeedbackError::Dom(format!("bad element name '{name}': {e:?}")))?;
    let fragment = Html::parse_fragment(&wrapped);
    fragment
        .select(&selector)
        .next()
        .map(|el| el.value().clone())
        .ok_or_else(|| CourseFeedbackError::Dom(format!("could not rebuild <{name}>")))
}

/// Merge `declarations` into an inline style string.
fn merge_declarations(existing: &str, declarations: &[(&str, &str)]) -> String {
    let mut merged: Vec<(String, String)> = existing
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            (!prop.is_empty()).then(|| (prop.to_string(), value.trim().to_string()))
        })
        .collect();

    for (prop, value) in declarations {
        match merged.iter_mut().find(|(p, _)| p == prop) {
            Some(slot) => slot.1 = value.to_string(),
            None => merged.push((prop.to_string(), value.to_string())),
        }
    }

    merged
        .iter()
        .map(|(p, v)| format!("{p}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape text for use in HTML content or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
