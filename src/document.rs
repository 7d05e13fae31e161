use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::escape::partial_escape;
use quick_xml::{Reader, Writer};
use std::string::FromUtf8Error;
use thiserror::Error;

/// A parsed flow-graph document.
///
/// Whitespace text inside the root is kept as-is so that untouched parts of
/// the document are written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<Declaration>,
    /// Comments, processing instructions and doctype before the root element.
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("XML syntax error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("Invalid UTF-8 in document: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Document has more than one root element: <{0}>")]
    MultipleRoots(String),

    #[error("Unexpected closing tag </{0}>")]
    UnbalancedEnd(String),

    #[error("Element <{0}> is never closed")]
    UnclosedElement(String),

    #[error("Text outside of the root element: {0:?}")]
    TextOutsideRoot(String),

    #[error("Failed to write document: {0}")]
    Write(String),
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self {
            declaration: None,
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse XML text into a document tree.
    pub fn parse(source: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(source);
        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        let mut open: Vec<Element> = Vec::new();

        loop {
            let node = match reader.read_event()? {
                Event::Decl(decl) => {
                    declaration = Some(Declaration::from_event(&decl)?);
                    continue;
                }
                Event::Start(start) => {
                    open.push(Element::from_start(&start)?);
                    continue;
                }
                Event::End(end) => match open.pop() {
                    Some(element) => Node::Element(element),
                    None => {
                        return Err(DocumentError::UnbalancedEnd(decode(end.name().as_ref())?))
                    }
                },
                Event::Empty(start) => Node::Element(Element::from_start(&start)?),
                Event::Text(text) => Node::Text(text.unescape()?.into_owned()),
                Event::CData(cdata) => Node::CData(decode(&cdata.into_inner())?),
                Event::Comment(comment) => Node::Comment(decode(&comment)?),
                Event::PI(pi) => Node::ProcessingInstruction(decode(&pi)?),
                Event::DocType(doctype) => Node::DocType(decode(&doctype)?),
                Event::Eof => break,
            };

            if let Some(parent) = open.last_mut() {
                parent.children.push(node);
                continue;
            }

            match node {
                Node::Element(element) => match root {
                    Some(_) => return Err(DocumentError::MultipleRoots(element.name)),
                    None => root = Some(element),
                },
                Node::Text(text) | Node::CData(text) => {
                    if !text.trim().is_empty() {
                        return Err(DocumentError::TextOutsideRoot(text));
                    }
                }
                other if root.is_none() => prolog.push(other),
                other => epilog.push(other),
            }
        }

        if let Some(unclosed) = open.pop() {
            return Err(DocumentError::UnclosedElement(unclosed.name));
        }

        Ok(Self {
            declaration,
            prolog,
            root: root.ok_or(DocumentError::MissingRoot)?,
            epilog,
        })
    }

    /// Serialize the tree back to XML text, always with an XML declaration.
    pub fn to_xml_string(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new(Vec::new());

        let declaration = self.declaration.clone().unwrap_or_default();
        write_event(
            &mut writer,
            Event::Decl(BytesDecl::new(
                &declaration.version,
                declaration.encoding.as_deref(),
                declaration.standalone.as_deref(),
            )),
        )?;
        write_event(&mut writer, Event::Text(BytesText::new("\n")))?;

        for node in &self.prolog {
            write_node(&mut writer, node)?;
            write_event(&mut writer, Event::Text(BytesText::new("\n")))?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_event(&mut writer, Event::Text(BytesText::new("\n")))?;
            write_node(&mut writer, node)?;
        }

        Ok(String::from_utf8(writer.into_inner())?)
    }
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("utf-8".to_string()),
            standalone: None,
        }
    }
}

impl Declaration {
    fn from_event(decl: &BytesDecl<'_>) -> Result<Self, DocumentError> {
        let version = decode(&decl.version()?)?;
        let encoding = decl.encoding().transpose()?.map(|e| decode(&e)).transpose()?;
        let standalone = decl.standalone().transpose()?.map(|s| decode(&s)).transpose()?;
        Ok(Self {
            version,
            encoding,
            standalone,
        })
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, DocumentError> {
        let mut element = Element::new(decode(start.name().as_ref())?);
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = decode(attribute.key.as_ref())?;
            let value = attribute.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child element named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|child| child.name == name)
    }

    /// Concatenated text and CDATA content, or `None` if the element has none.
    pub fn text(&self) -> Option<String> {
        let mut text: Option<String> = None;
        for node in &self.children {
            if let Node::Text(part) | Node::CData(part) = node {
                text.get_or_insert_with(String::new).push_str(part);
            }
        }
        text.filter(|t| !t.is_empty())
    }

    /// Text of the first child element named `name`.
    ///
    /// Outer `None`: no such child. Inner `None`: the child has no text.
    pub fn child_text(&self, name: &str) -> Option<Option<String>> {
        self.child(name).map(Element::text)
    }

    /// Replace all text content, keeping child elements in place.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let position = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Text(_) | Node::CData(_)))
            .unwrap_or(0);
        self.children
            .retain(|node| !matches!(node, Node::Text(_) | Node::CData(_)));
        let position = position.min(self.children.len());
        self.children.insert(position, Node::Text(text.into()));
    }

    /// Visit every descendant named `name` in document order, stopping at the first error.
    pub fn visit_descendants_mut<E, F>(&mut self, name: &str, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&mut Element) -> Result<(), E>,
    {
        for child in self.child_elements_mut() {
            if child.name == name {
                visit(child)?;
            }
            child.visit_descendants_mut(name, visit)?;
        }
        Ok(())
    }

    /// Every descendant named `name`, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// First descendant, in document order, accepted by `predicate`.
    pub fn find_descendant_mut<P>(&mut self, predicate: &P) -> Option<&mut Element>
    where
        P: Fn(&Element) -> bool,
    {
        for child in self.child_elements_mut() {
            if predicate(&*child) {
                return Some(child);
            }
            if let Some(found) = child.find_descendant_mut(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Remove the child nodes at `positions` (indices into `children`).
    ///
    /// A whitespace-only text node directly before a removed element goes with
    /// it, so removed lines do not leave blank lines behind.
    pub fn remove_children(&mut self, positions: &[usize]) {
        if positions.is_empty() {
            return;
        }

        let mut doomed = vec![false; self.children.len()];
        for &position in positions {
            if position >= doomed.len() {
                continue;
            }
            doomed[position] = true;
            if let Some(Node::Text(text)) = position.checked_sub(1).and_then(|p| self.children.get(p)) {
                if text.trim().is_empty() {
                    doomed[position - 1] = true;
                }
            }
        }

        let mut index = 0;
        self.children.retain(|_| {
            let keep = !doomed[index];
            index += 1;
            keep
        });
    }
}

fn decode(bytes: &[u8]) -> Result<String, DocumentError> {
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), DocumentError> {
    writer
        .write_event(event)
        .map_err(|e| DocumentError::Write(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), DocumentError> {
    match node {
        Node::Element(element) => write_element(writer, element),
        Node::Text(text) => write_event(writer, Event::Text(BytesText::from_escaped(partial_escape(text)))),
        Node::CData(text) => write_event(writer, Event::CData(BytesCData::new(text.as_str()))),
        Node::Comment(text) => write_event(writer, Event::Comment(BytesText::from_escaped(text.as_str()))),
        Node::ProcessingInstruction(text) => write_event(writer, Event::PI(BytesPI::new(text.as_str()))),
        Node::DocType(text) => write_event(writer, Event::DocType(BytesText::from_escaped(text.as_str()))),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), DocumentError> {
    let start = BytesStart::new(element.name.as_str()).with_attributes(
        element
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );

    if element.children.is_empty() {
        return write_event(writer, Event::Empty(start));
    }

    write_event(writer, Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    write_event(writer, Event::End(BytesEnd::new(element.name.as_str())))
}
