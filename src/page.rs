use kuchiki::NodeRef;
use kuchiki::traits::*;
use thiserror::Error;

const TEMPLATE_WRAPPER_ID: &str = "__miniapp_template_wrapper";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("element #{0} not found")]
    MissingElement(String),
    #[error("html manipulation failed: {0}")]
    Html(String),
}

/// Parsed HTML document the renderer writes into.
pub struct Page {
    document: NodeRef,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        Self {
            document: kuchiki::parse_html().one(html),
        }
    }

    pub fn element_by_id(&self, id: &str) -> Result<NodeRef, RenderError> {
        self.document
            .select_first(&format!("#{id}"))
            .map(|node| node.as_node().clone())
            .map_err(|_| RenderError::MissingElement(id.to_string()))
    }

    pub fn to_html(&self) -> String {
        self.document.to_string()
    }
}

/// Replaces the children of `target` with nodes parsed from `template_html`.
///
/// Only trusted, constant markup goes through here; dynamic values are
/// attached afterwards with [`set_text`].
pub fn replace_children(target: &NodeRef, template_html: &str) -> Result<(), RenderError> {
    let existing: Vec<_> = target.children().collect();
    for child in existing {
        child.detach();
    }

    let wrapper_html = format!("<div id=\"{TEMPLATE_WRAPPER_ID}\">{template_html}</div>");
    let fragment_doc = kuchiki::parse_html().one(wrapper_html);
    let wrapper = fragment_doc
        .select_first(&format!("#{TEMPLATE_WRAPPER_ID}"))
        .map_err(|_| RenderError::Html("template wrapper not found".to_string()))?;
    let children: Vec<_> = wrapper.as_node().children().collect();
    for child in children {
        target.append(child);
    }
    Ok(())
}

/// Finds the first descendant of `root` matching `selector`.
pub fn select_in(root: &NodeRef, selector: &str) -> Result<NodeRef, RenderError> {
    root.select_first(selector)
        .map(|node| node.as_node().clone())
        .map_err(|_| RenderError::Html(format!("query selector {selector} matched nothing")))
}

/// Sets the text content of `node`; markup in `text` is kept as literal text.
pub fn set_text(node: &NodeRef, text: &str) {
    let existing: Vec<_> = node.children().collect();
    for child in existing {
        child.detach();
    }
    node.append(NodeRef::new_text(text));
}

pub fn set_attribute(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

#[cfg(test)]
pub fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
}
