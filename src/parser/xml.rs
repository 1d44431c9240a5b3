//! VoiceXML reader built on `quick-xml`.
//!
//! Parsing happens in two passes. The event reader first builds a small
//! element tree ([`XmlElement`]), then [`DocumentBuilder`] walks the tree and
//! produces the model, rejecting anything it does not understand:
//!
//! | failure                                   | error                          |
//! |-------------------------------------------|--------------------------------|
//! | blank URI, unreadable file                | [`DocumentError::NotFound`]    |
//! | malformed XML                             | [`DocumentError::Parse`]       |
//! | root not `<vxml>`, duplicate names, ...   | [`DocumentError::Validation`]  |

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, instrument};

use super::DocumentParser;
use crate::error::DocumentError;
use crate::event::{ERROR, HELP, NOINPUT, NOMATCH};
use crate::model::action::{Action, ConditionalBranch, GotoTarget};
use crate::model::document::{Dialog, Document};
use crate::model::form::{Form, FormItem, FormItemKind, GrammarRef, InputMode, VariableDecl};
use crate::model::menu::{Choice, Menu};
use crate::model::prompt::{Prompt, PromptSegment};
use crate::event::handler::{EventHandlerTable, Handler};

/// Reads documents from the local filesystem. `file://` URIs are accepted.
#[derive(Debug, Default, Clone)]
pub struct XmlDocumentParser;

impl XmlDocumentParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses document text that was fetched elsewhere.
    pub fn parse_str(uri: &str, source: &str) -> Result<Document, DocumentError> {
        let root = read_tree(uri, source)?;
        DocumentBuilder { uri }.build(&root)
    }
}

#[async_trait]
impl DocumentParser for XmlDocumentParser {
    #[instrument(skip(self))]
    async fn parse(&self, uri: &str) -> Result<Arc<Document>, DocumentError> {
        let not_found = || DocumentError::NotFound {
            uri: uri.to_string(),
        };
        let path = uri.trim();
        let path = path.strip_prefix("file://").unwrap_or(path);
        if path.is_empty() {
            return Err(not_found());
        }
        let source = tokio::fs::read_to_string(Path::new(path)).await.map_err(|e| {
            debug!("cannot read {}: {}", path, e);
            not_found()
        })?;
        let document = Self::parse_str(uri, &source)?;
        debug!(dialogs = document.dialogs.len(), "document parsed");
        Ok(Arc::new(document))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart) -> Result<Self, quick_xml::Error> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenated text of this element and its descendants.
    fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) => text.push_str(t),
                XmlNode::Element(e) => text.push_str(&e.text()),
            }
        }
        text
    }
}

fn read_tree(uri: &str, source: &str) -> Result<XmlElement, DocumentError> {
    let parse_error = |message: String| DocumentError::Parse {
        uri: uri.to_string(),
        message,
    };
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(parse_error(format!(
                    "{} at position {}",
                    e,
                    reader.error_position()
                )))
            }
        };
        match event {
            Event::Start(start) => {
                let element =
                    XmlElement::from_start(&start).map_err(|e| parse_error(e.to_string()))?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element =
                    XmlElement::from_start(&start).map_err(|e| parse_error(e.to_string()))?;
                attach(&mut stack, &mut root, element).map_err(parse_error)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| parse_error("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element).map_err(parse_error)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| parse_error(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(XmlNode::Text(String::from_utf8_lossy(&data).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(parse_error(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| parse_error("document has no root element".to_string()))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(format!("second root element <{}>", element.name)),
    }
    Ok(())
}

const HANDLER_ELEMENTS: [&str; 5] = ["catch", NOINPUT, NOMATCH, HELP, ERROR];
const IGNORED_ELEMENTS: [&str; 3] = ["meta", "metadata", "property"];

struct DocumentBuilder<'a> {
    uri: &'a str,
}

impl DocumentBuilder<'_> {
    fn invalid<S: Into<String>>(&self, message: S) -> DocumentError {
        DocumentError::Validation {
            uri: self.uri.to_string(),
            message: message.into(),
        }
    }

    fn required<'e>(&self, element: &'e XmlElement, attr: &str) -> Result<&'e str, DocumentError> {
        element
            .attr(attr)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                self.invalid(format!(
                    "<{}> requires a {} attribute",
                    element.name, attr
                ))
            })
    }

    fn unsupported(&self, element: &XmlElement, parent: &str) -> DocumentError {
        self.invalid(format!(
            "unsupported element <{}> in <{}>",
            element.name, parent
        ))
    }

    fn build(&self, root: &XmlElement) -> Result<Document, DocumentError> {
        if root.name != "vxml" {
            return Err(self.invalid(format!(
                "root element is <{}>, expected <vxml>",
                root.name
            )));
        }
        let mut document = Document::new(self.uri);
        let mut ids = HashSet::new();
        for child in root.elements() {
            match child.name.as_str() {
                "var" => document.variables.push(self.variable(child)?),
                "form" => {
                    let form = self.form(child, document.dialogs.len())?;
                    self.unique_id(&mut ids, &form.id)?;
                    document.dialogs.push(Dialog::Form(form));
                }
                "menu" => {
                    let menu = self.menu(child, document.dialogs.len())?;
                    self.unique_id(&mut ids, &menu.id)?;
                    document.dialogs.push(Dialog::Menu(menu));
                }
                name if HANDLER_ELEMENTS.contains(&name) => {
                    self.handler(child, &mut document.handlers)?
                }
                name if IGNORED_ELEMENTS.contains(&name) => {}
                _ => return Err(self.unsupported(child, "vxml")),
            }
        }
        Ok(document)
    }

    fn unique_id(&self, ids: &mut HashSet<String>, id: &str) -> Result<(), DocumentError> {
        if ids.insert(id.to_string()) {
            Ok(())
        } else {
            Err(self.invalid(format!("duplicate dialog id {}", id)))
        }
    }

    fn variable(&self, element: &XmlElement) -> Result<VariableDecl, DocumentError> {
        let name = self.required(element, "name")?;
        Ok(VariableDecl::new(name, element.attr("expr")))
    }

    fn form(&self, element: &XmlElement, position: usize) -> Result<Form, DocumentError> {
        let id = element
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("_dialog{}", position));
        let mut form = Form::new(id);
        let mut names = HashSet::new();
        for child in element.elements() {
            let item = match child.name.as_str() {
                "var" => {
                    form.variables.push(self.variable(child)?);
                    continue;
                }
                name if HANDLER_ELEMENTS.contains(&name) => {
                    self.handler(child, &mut form.handlers)?;
                    continue;
                }
                "field" => self.field(child)?,
                "block" => self.block(child, form.items.len())?,
                "initial" => self.initial(child, form.items.len())?,
                name if IGNORED_ELEMENTS.contains(&name) => continue,
                _ => return Err(self.unsupported(child, "form")),
            };
            if !names.insert(item.name.clone()) {
                return Err(self.invalid(format!(
                    "duplicate form item name {} in form {}",
                    item.name, form.id
                )));
            }
            form.items.push(item);
        }
        Ok(form)
    }

    fn field(&self, element: &XmlElement) -> Result<FormItem, DocumentError> {
        let mut item = FormItem::field(self.required(element, "name")?);
        item.guard = visit_condition(element);
        let mut grammar = element
            .attr("type")
            .map(|builtin| GrammarRef::src(format!("builtin:{}", builtin)));
        let timeout = element
            .attr("timeout")
            .map(|value| {
                parse_duration(value)
                    .ok_or_else(|| self.invalid(format!("invalid timeout {:?}", value)))
            })
            .transpose()?;

        for child in element.elements() {
            match child.name.as_str() {
                "prompt" => item.prompts.push(self.prompt(child)?),
                "grammar" => grammar = Some(self.grammar(child)?),
                "filled" => item.actions.extend(self.actions(child)?),
                name if HANDLER_ELEMENTS.contains(&name) => {
                    self.handler(child, &mut item.handlers)?
                }
                name if IGNORED_ELEMENTS.contains(&name) => {}
                _ => return Err(self.unsupported(child, "field")),
            }
        }
        item.kind = FormItemKind::Field { grammar, timeout };
        Ok(item)
    }

    fn block(&self, element: &XmlElement, position: usize) -> Result<FormItem, DocumentError> {
        let name = element
            .attr("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("_block{}", position));
        let mut item = FormItem::block(name);
        item.guard = visit_condition(element);
        item.actions = self.actions(element)?;
        Ok(item)
    }

    fn initial(&self, element: &XmlElement, position: usize) -> Result<FormItem, DocumentError> {
        let name = element
            .attr("name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("_initial{}", position));
        let mut item = FormItem::initial(name);
        item.guard = visit_condition(element);
        for child in element.elements() {
            match child.name.as_str() {
                "prompt" => item.prompts.push(self.prompt(child)?),
                name if HANDLER_ELEMENTS.contains(&name) => {
                    self.handler(child, &mut item.handlers)?
                }
                _ => return Err(self.unsupported(child, "initial")),
            }
        }
        Ok(item)
    }

    fn grammar(&self, element: &XmlElement) -> Result<GrammarRef, DocumentError> {
        let mode = match element.attr("mode") {
            Some(mode) => mode
                .parse::<InputMode>()
                .map_err(|_| self.invalid(format!("invalid grammar mode {:?}", mode)))?,
            None => InputMode::default(),
        };
        match element.attr("src") {
            Some(src) => Ok(GrammarRef {
                src: Some(src.to_string()),
                content: None,
                mode,
            }),
            None => {
                let content = element.text();
                if content.trim().is_empty() {
                    return Err(self.invalid("<grammar> needs a src attribute or inline content"));
                }
                Ok(GrammarRef::inline(content.trim(), mode))
            }
        }
    }

    fn menu(&self, element: &XmlElement, position: usize) -> Result<Menu, DocumentError> {
        let id = element
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("_dialog{}", position));
        let mut menu = Menu::new(id);
        for child in element.elements() {
            match child.name.as_str() {
                "prompt" => menu.prompts.push(self.prompt(child)?),
                "choice" => {
                    let next = self.required(child, "next")?;
                    let text = child.text().split_whitespace().collect::<Vec<_>>().join(" ");
                    let mut choice = Choice::new(text, next);
                    choice.dtmf = child.attr("dtmf").map(str::to_string);
                    if choice.text.is_empty() && choice.dtmf.is_none() {
                        return Err(self.invalid("<choice> needs text or a dtmf attribute"));
                    }
                    menu.choices.push(choice);
                }
                name if HANDLER_ELEMENTS.contains(&name) => {
                    self.handler(child, &mut menu.handlers)?
                }
                name if IGNORED_ELEMENTS.contains(&name) => {}
                _ => return Err(self.unsupported(child, "menu")),
            }
        }
        if menu.choices.is_empty() {
            return Err(self.invalid(format!("menu {} has no choices", menu.id)));
        }
        Ok(menu)
    }

    /// `<catch event="a b">` registers the same actions under each name; the
    /// shorthand elements register under their own name.
    fn handler(
        &self,
        element: &XmlElement,
        table: &mut EventHandlerTable,
    ) -> Result<(), DocumentError> {
        let actions = self.actions(element)?;
        if element.name != "catch" {
            table.add_handler(&element.name, Handler::new(actions));
            return Ok(());
        }
        let events: Vec<&str> = element
            .attr("event")
            .map(|list| list.split_whitespace().collect())
            .unwrap_or_default();
        if events.is_empty() {
            table.add_handler("", Handler::new(actions));
        } else {
            for event in events {
                table.add_handler(event, Handler::new(actions.clone()));
            }
        }
        Ok(())
    }

    fn prompt(&self, element: &XmlElement) -> Result<Prompt, DocumentError> {
        let mut prompt = Prompt::default();
        self.prompt_segments(element, &mut prompt.segments)?;
        Ok(prompt)
    }

    fn prompt_segments(
        &self,
        element: &XmlElement,
        segments: &mut Vec<PromptSegment>,
    ) -> Result<(), DocumentError> {
        for node in &element.children {
            match node {
                XmlNode::Text(text) => segments.push(PromptSegment::Text(text.clone())),
                XmlNode::Element(child) if child.name == "value" => {
                    let expr = self.required(child, "expr")?;
                    segments.push(PromptSegment::Value(expr.to_string()));
                }
                XmlNode::Element(child) if child.name == "break" => {
                    segments.push(PromptSegment::Text(" ".to_string()))
                }
                // SSML wrappers (audio, emphasis, say-as, ...) contribute their text.
                XmlNode::Element(child) => self.prompt_segments(child, segments)?,
            }
        }
        Ok(())
    }

    fn actions(&self, element: &XmlElement) -> Result<Vec<Action>, DocumentError> {
        let mut actions = Vec::new();
        for node in &element.children {
            if let Some(action) = self.action(node, &element.name)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    fn action(&self, node: &XmlNode, parent: &str) -> Result<Option<Action>, DocumentError> {
        let element = match node {
            // Bare text in executable content is an implicit prompt.
            XmlNode::Text(text) if text.trim().is_empty() => return Ok(None),
            XmlNode::Text(text) => return Ok(Some(Action::Prompt(Prompt::text(text.trim())))),
            XmlNode::Element(element) => element,
        };
        let action = match element.name.as_str() {
            "assign" => Action::Assign {
                name: self.required(element, "name")?.to_string(),
                expr: self.required(element, "expr")?.to_string(),
            },
            "var" => Action::Var {
                name: self.required(element, "name")?.to_string(),
                expr: element.attr("expr").map(str::to_string),
            },
            "clear" => Action::Clear {
                names: element
                    .attr("namelist")
                    .map(|list| list.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            },
            "prompt" | "audio" => Action::Prompt(self.prompt(element)?),
            "value" => Action::Prompt(Prompt::default().with_value(self.required(element, "expr")?)),
            "reprompt" => Action::Reprompt,
            "goto" => match (element.attr("next"), element.attr("nextitem")) {
                (Some(next), None) if next.starts_with('#') => Action::Goto(GotoTarget::dialog(next)),
                (Some(next), None) => {
                    return Err(self.invalid(format!(
                        "only same-document targets are supported, got {:?}",
                        next
                    )))
                }
                (None, Some(item)) => Action::Goto(GotoTarget::Item(item.to_string())),
                _ => return Err(self.invalid("<goto> needs exactly one of next or nextitem")),
            },
            "throw" => Action::Throw {
                event: self.required(element, "event")?.to_string(),
                message: element.attr("message").map(str::to_string),
            },
            "exit" => Action::Exit,
            "disconnect" => Action::Disconnect,
            "log" => {
                let mut prompt = self.prompt(element)?;
                if let Some(expr) = element.attr("expr") {
                    prompt.segments.push(PromptSegment::Value(expr.to_string()));
                }
                Action::Log(prompt)
            }
            "if" => self.conditional(element)?,
            _ => return Err(self.unsupported(element, parent)),
        };
        Ok(Some(action))
    }

    /// `<if>` children are split into branches at each `<elseif>`/`<else>`.
    fn conditional(&self, element: &XmlElement) -> Result<Action, DocumentError> {
        let mut branches = vec![ConditionalBranch {
            cond: self.required(element, "cond")?.to_string(),
            actions: Vec::new(),
        }];
        let mut otherwise: Option<Vec<Action>> = None;

        for node in &element.children {
            match node {
                XmlNode::Element(child) if child.name == "elseif" => {
                    if otherwise.is_some() {
                        return Err(self.invalid("<elseif> after <else>"));
                    }
                    branches.push(ConditionalBranch {
                        cond: self.required(child, "cond")?.to_string(),
                        actions: Vec::new(),
                    });
                }
                XmlNode::Element(child) if child.name == "else" => {
                    if otherwise.is_some() {
                        return Err(self.invalid("more than one <else> in <if>"));
                    }
                    otherwise = Some(Vec::new());
                }
                node => {
                    let Some(action) = self.action(node, "if")? else {
                        continue;
                    };
                    match (&mut otherwise, branches.last_mut()) {
                        (Some(actions), _) => actions.push(action),
                        (None, Some(branch)) => branch.actions.push(action),
                        (None, None) => {}
                    }
                }
            }
        }
        Ok(Action::If {
            branches,
            otherwise: otherwise.unwrap_or_default(),
        })
    }
}

/// `"5s"`, `"500ms"`, `"2.5s"`.
/// `cond` says when an item may be visited; the guard says when it is
/// satisfied, so the condition is negated.
fn visit_condition(element: &XmlElement) -> Option<String> {
    element.attr("cond").map(|cond| format!("!({})", cond))
}

fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, scale) = if let Some(ms) = value.strip_suffix("ms") {
        (ms, 0.001)
    } else if let Some(s) = value.strip_suffix('s') {
        (s, 1.0)
    } else {
        return None;
    };
    let seconds = number.trim().parse::<f64>().ok()? * scale;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}
