//! In-memory page model implementing `Driver` for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepwise_engine::driver::{
    ClickOptions, Driver, DriverError, ElementHandle, NetworkEvent, Query, SearchRoot, TextMatch,
};

/// Side effect applied when an element is clicked.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Attach and show another element.
    Reveal(u64),
    /// Remove an element from the document.
    Remove(u64),
    /// Replace another element's text with the next entry of the list.
    CycleText(u64, Vec<String>),
    Navigate(String),
    SetValue(u64, String),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub visible: bool,
    pub attached: bool,
    pub checked: bool,
    pub value: String,
    pub frame: Option<String>,
    pub parent: Option<u64>,
    pub options: Vec<String>,
    pub files: Vec<PathBuf>,
    /// `fill()` succeeds but leaves the value untouched.
    pub ignores_assignment: bool,
    /// `check(false)` succeeds without changing state.
    pub check_needs_force: bool,
    pub check_fails: bool,
    pub click_blocked: bool,
    pub force_blocked: bool,
    pub script_blocked: bool,
    pub on_click: Vec<Effect>,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            text: String::new(),
            visible: true,
            attached: true,
            checked: false,
            value: String::new(),
            frame: None,
            parent: None,
            options: Vec::new(),
            files: Vec::new(),
            ignores_assignment: false,
            check_needs_force: false,
            check_fails: false,
            click_blocked: false,
            force_blocked: false,
            script_blocked: false,
            on_click: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self.visible = false;
        self
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn child_of(mut self, parent: u64) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn in_frame(mut self, frame: &str) -> Self {
        self.frame = Some(frame.to_string());
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn ignores_assignment(mut self) -> Self {
        self.ignores_assignment = true;
        self
    }

    pub fn check_needs_force(mut self) -> Self {
        self.check_needs_force = true;
        self
    }

    pub fn check_fails(mut self) -> Self {
        self.check_fails = true;
        self
    }

    pub fn click_blocked(mut self) -> Self {
        self.click_blocked = true;
        self
    }

    pub fn force_blocked(mut self) -> Self {
        self.force_blocked = true;
        self
    }

    pub fn script_blocked(mut self) -> Self {
        self.script_blocked = true;
        self
    }

    pub fn on_click(mut self, effect: Effect) -> Self {
        self.on_click.push(effect);
        self
    }

    fn attr_of(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn input_type(&self) -> String {
        self.attr_of("type").unwrap_or("").to_lowercase()
    }

    fn implicit_role(&self) -> Option<String> {
        if let Some(role) = self.attr_of("role") {
            return Some(role.to_lowercase());
        }
        let role = match self.tag.as_str() {
            "button" => "button",
            "a" if self.attrs.contains_key("href") => "link",
            "textarea" => "textbox",
            "select" => "combobox",
            "option" => "option",
            "input" => match self.input_type().as_str() {
                "" | "text" | "email" | "search" | "tel" | "url" => "textbox",
                "checkbox" => "checkbox",
                "radio" => "radio",
                "submit" | "button" => "button",
                _ => return None,
            },
            _ => return None,
        };
        Some(role.to_string())
    }
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    pub url: String,
    pub html: Option<String>,
    elements: Vec<FakeElement>,
    xpaths: HashMap<String, Vec<u64>>,
    pub failing_urls: Vec<String>,
    pub focused: Option<u64>,
    select_all: bool,
    pub calls: Vec<String>,
    pub console: Vec<(String, String)>,
    pub network: Vec<NetworkEvent>,
    pub paused: Duration,
    pub screenshots: Vec<PathBuf>,
    pub trace_path: Option<PathBuf>,
    pub enter_effects: Vec<Effect>,
}

impl FakeDriver {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Add an element; ids are assigned in document order.
    pub fn add(&mut self, element: FakeElement) -> u64 {
        self.elements.push(element);
        (self.elements.len() - 1) as u64
    }

    pub fn register_xpath(&mut self, expr: &str, ids: &[u64]) {
        self.xpaths.insert(expr.to_string(), ids.to_vec());
    }

    pub fn element(&self, id: u64) -> &FakeElement {
        &self.elements[id as usize]
    }

    pub fn element_mut(&mut self, id: u64) -> &mut FakeElement {
        &mut self.elements[id as usize]
    }

    pub fn handle(&self, id: u64) -> ElementHandle {
        let root = match &self.elements[id as usize].frame {
            Some(frame) => SearchRoot::Frame(frame.clone()),
            None => SearchRoot::Main,
        };
        ElementHandle::new(root, id)
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls.iter().filter(|c| c.starts_with(prefix)).cloned().collect()
    }

    fn get(&self, handle: &ElementHandle) -> Result<&FakeElement, DriverError> {
        self.elements
            .get(handle.id as usize)
            .filter(|e| e.attached)
            .ok_or(DriverError::StaleElement(handle.id))
    }

    fn get_mut(&mut self, handle: &ElementHandle) -> Result<&mut FakeElement, DriverError> {
        self.elements
            .get_mut(handle.id as usize)
            .filter(|e| e.attached)
            .ok_or(DriverError::StaleElement(handle.id))
    }

    fn in_root(&self, id: usize, root: &SearchRoot) -> bool {
        let element = &self.elements[id];
        match root {
            SearchRoot::Main => element.frame.is_none(),
            SearchRoot::Frame(frame) => element.frame.as_deref() == Some(frame.as_str()),
        }
    }

    fn ancestors(&self, id: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = self.elements[id].parent;
        while let Some(parent) = current {
            out.push(parent as usize);
            current = self.elements[parent as usize].parent;
        }
        out
    }

    fn is_descendant(&self, id: usize, ancestor: usize) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    fn inner_text_of(&self, id: usize) -> String {
        let mut parts = vec![self.elements[id].text.clone()];
        for (child, element) in self.elements.iter().enumerate() {
            if element.parent == Some(id as u64) && element.attached {
                parts.push(self.inner_text_of(child));
            }
        }
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn labels_for(&self, id: usize) -> Vec<usize> {
        let element = &self.elements[id];
        let own_id = element.attr_of("id");
        self.elements
            .iter()
            .enumerate()
            .filter(|(i, l)| {
                l.tag == "label"
                    && l.attached
                    && ((own_id.is_some() && l.attr_of("for") == own_id)
                        || self.is_descendant(id, *i))
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn accessible_name(&self, id: usize) -> String {
        let element = &self.elements[id];
        if let Some(label) = element.attr_of("aria-label") {
            return label.to_string();
        }
        let labels = self.labels_for(id);
        if let Some(label) = labels.first() {
            return self.inner_text_of(*label);
        }
        let text = self.inner_text_of(id);
        if !text.is_empty() {
            return text;
        }
        element
            .attr_of("value")
            .or_else(|| element.attr_of("placeholder"))
            .unwrap_or("")
            .to_string()
    }

    fn is_control(&self, id: usize) -> bool {
        matches!(self.elements[id].tag.as_str(), "input" | "select" | "textarea")
    }

    fn matches_query(&self, id: usize, query: &Query) -> bool {
        let element = &self.elements[id];
        match query {
            Query::Css(css) => self.matches_css(id, css),
            Query::CssWithText { css, text } => {
                self.matches_css(id, css) && text.matches(&self.inner_text_of(id))
            }
            Query::Text(m) => !element.text.trim().is_empty() && m.matches(&element.text),
            Query::Placeholder(m) => element.attr_of("placeholder").is_some_and(|p| m.matches(p)),
            Query::Role { role, name } => {
                element.implicit_role().as_deref() == Some(role.as_str())
                    && name_matches(name, &self.accessible_name(id))
            }
            Query::Label(m) => {
                if !self.is_control(id) {
                    return false;
                }
                if element.attr_of("aria-label").is_some_and(|l| m.matches(l)) {
                    return true;
                }
                self.labels_for(id)
                    .into_iter()
                    .any(|l| m.matches(&self.inner_text_of(l)))
            }
            Query::XPath(_) => false,
        }
    }

    fn query_ids(&self, root: &SearchRoot, query: &Query) -> Vec<usize> {
        if let Query::XPath(expr) = query {
            return self
                .xpaths
                .get(expr)
                .map(|ids| {
                    ids.iter()
                        .map(|i| *i as usize)
                        .filter(|i| self.elements[*i].attached && self.in_root(*i, root))
                        .collect()
                })
                .unwrap_or_default();
        }
        (0..self.elements.len())
            .filter(|i| self.elements[*i].attached && self.in_root(*i, root))
            .filter(|i| self.matches_query(*i, query))
            .collect()
    }

    // ============================================================
    // Minimal CSS matcher
    // ============================================================

    fn matches_css(&self, id: usize, css: &str) -> bool {
        split_top(css, ',')
            .iter()
            .any(|complex| self.matches_complex(id, complex.trim()))
    }

    fn matches_complex(&self, id: usize, complex: &str) -> bool {
        let compounds = split_top(complex, ' ');
        let compounds: Vec<&str> = compounds.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        let Some((last, rest)) = compounds.split_last() else {
            return false;
        };
        if !self.matches_compound(id, last) {
            return false;
        }
        let mut ancestors = self.ancestors(id).into_iter();
        for compound in rest.iter().rev() {
            if !ancestors.any(|a| self.matches_compound(a, compound)) {
                return false;
            }
        }
        true
    }

    fn matches_compound(&self, id: usize, compound: &str) -> bool {
        let Some(conditions) = parse_compound(compound) else {
            return false;
        };
        let element = &self.elements[id];
        conditions.iter().all(|cond| match cond {
            Cond::Tag(tag) => tag == "*" || element.tag.eq_ignore_ascii_case(tag),
            Cond::Id(want) => element.attr_of("id") == Some(want.as_str()),
            Cond::Class(want) => element
                .attr_of("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c == want)),
            Cond::Attr { name, op, value, ci } => {
                let Some(actual) = element.attr_of(name) else {
                    return false;
                };
                let (actual, value) = if *ci {
                    (actual.to_lowercase(), value.to_lowercase())
                } else {
                    (actual.to_string(), value.clone())
                };
                match op.as_str() {
                    "" => true,
                    "=" => actual == value,
                    "*=" => actual.contains(&value),
                    "^=" => actual.starts_with(&value),
                    "$=" => actual.ends_with(&value),
                    _ => false,
                }
            }
            Cond::NotAttr(name) => element.attr_of(name).is_none(),
        })
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Reveal(id) => {
                    let element = &mut self.elements[id as usize];
                    element.attached = true;
                    element.visible = true;
                }
                Effect::Remove(id) => {
                    let element = &mut self.elements[id as usize];
                    element.attached = false;
                    element.visible = false;
                }
                Effect::CycleText(id, texts) => {
                    let clicks = self
                        .calls
                        .iter()
                        .filter(|c| c.starts_with(&format!("effect#{}", id)))
                        .count();
                    if let Some(next) = texts.get(clicks) {
                        self.elements[id as usize].text = next.clone();
                    }
                    self.calls.push(format!("effect#{}", id));
                }
                Effect::Navigate(url) => self.url = url,
                Effect::SetValue(id, value) => self.elements[id as usize].value = value,
            }
        }
    }

    fn activate(&mut self, id: usize) {
        let element = &self.elements[id];
        let kind = element.input_type();
        if element.tag == "input" && kind == "checkbox" {
            let checked = !element.checked;
            self.elements[id].checked = checked;
        } else if element.tag == "input" && kind == "radio" {
            self.elements[id].checked = true;
        } else if element.tag == "label" {
            let target = element
                .attr_of("for")
                .and_then(|f| {
                    self.elements
                        .iter()
                        .position(|e| e.attr_of("id") == Some(f))
                })
                .or_else(|| {
                    (0..self.elements.len()).find(|i| {
                        self.is_descendant(*i, id)
                            && self.elements[*i].tag == "input"
                            && matches!(self.elements[*i].input_type().as_str(), "checkbox" | "radio")
                    })
                });
            if let Some(target) = target {
                self.activate(target);
            }
        }
        let effects = self.elements[id].on_click.clone();
        self.apply(effects);
        self.focused = Some(id as u64);
        self.select_all = false;
    }
}

fn name_matches(name: &TextMatch, accessible: &str) -> bool {
    name.text().is_empty() || name.matches(accessible)
}

#[derive(Debug)]
enum Cond {
    Tag(String),
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: String,
        value: String,
        ci: bool,
    },
    NotAttr(String),
}

/// Split on `sep` outside quotes, brackets and parentheses.
fn split_top(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' | '(' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | ')' => {
                    depth -= 1;
                    current.push(c);
                }
                c if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(compound: &str) -> Option<Vec<Cond>> {
    let chars: Vec<char> = compound.chars().collect();
    let mut conds = Vec::new();
    let mut i = 0;
    let take_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if i < chars.len() && (chars[i] == '*' || is_ident(chars[i])) {
        if chars[i] == '*' {
            i += 1;
            conds.push(Cond::Tag("*".into()));
        } else {
            conds.push(Cond::Tag(take_ident(&mut i)));
        }
    }
    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                conds.push(Cond::Id(take_ident(&mut i)));
            }
            '.' => {
                i += 1;
                conds.push(Cond::Class(take_ident(&mut i)));
            }
            '[' => {
                let end = find_close(&chars, i)?;
                let inner: String = chars[i + 1..end].iter().collect();
                conds.push(parse_attr(&inner)?);
                i = end + 1;
            }
            ':' => {
                let rest: String = chars[i..].iter().collect();
                let inner = rest.strip_prefix(":not([")?;
                let close = inner.find("])")?;
                conds.push(Cond::NotAttr(inner[..close].trim().to_string()));
                i += ":not([".len() + close + 2;
            }
            _ => return None,
        }
    }
    Some(conds)
}

fn find_close(chars: &[char], open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in chars[open + 1..].iter().enumerate() {
        match quote {
            Some(q) if *c == q => quote = None,
            Some(_) => {}
            None if *c == '"' || *c == '\'' => quote = Some(*c),
            None if *c == ']' => return Some(open + 1 + offset),
            None => {}
        }
    }
    None
}

fn parse_attr(inner: &str) -> Option<Cond> {
    let inner = inner.trim();
    let Some(op_start) = inner.find(|c| "=*^$~|".contains(c)) else {
        return Some(Cond::Attr {
            name: inner.to_string(),
            op: String::new(),
            value: String::new(),
            ci: false,
        });
    };
    let name = inner[..op_start].trim().to_string();
    let eq = inner[op_start..].find('=')? + op_start;
    let op = inner[op_start..=eq].to_string();
    let mut rest = inner[eq + 1..].trim();
    let ci = rest.ends_with(" i");
    if ci {
        rest = rest[..rest.len() - 2].trim();
    }
    let value = rest.trim_matches(|c| c == '"' || c == '\'');
    let value = value.replace("\\\"", "\"").replace("\\\\", "\\");
    Some(Cond::Attr {
        name,
        op,
        value,
        ci,
    })
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.calls.push(format!("navigate {}", url));
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(DriverError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        self.url = url.to_string();
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.url.clone())
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        if let Some(html) = &self.html {
            return Ok(html.clone());
        }
        Ok(self
            .elements
            .iter()
            .filter(|e| e.attached)
            .map(|e| format!("<{}>{}</{}>", e.tag, e.text, e.tag))
            .collect())
    }

    async fn frames(&mut self) -> Result<Vec<SearchRoot>, DriverError> {
        let mut frames: Vec<String> = Vec::new();
        for element in &self.elements {
            if let Some(frame) = &element.frame
                && !frames.contains(frame)
            {
                frames.push(frame.clone());
            }
        }
        Ok(frames.into_iter().map(SearchRoot::Frame).collect())
    }

    async fn query_all(
        &mut self,
        root: &SearchRoot,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        Ok(self
            .query_ids(root, query)
            .into_iter()
            .map(|i| ElementHandle::new(root.clone(), i as u64))
            .collect())
    }

    async fn query_within(
        &mut self,
        element: &ElementHandle,
        query: &Query,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        self.get(element)?;
        let scope = element.id as usize;
        Ok(self
            .query_ids(&element.root, query)
            .into_iter()
            .filter(|i| self.is_descendant(*i, scope))
            .map(|i| ElementHandle::new(element.root.clone(), i as u64))
            .collect())
    }

    async fn closest(
        &mut self,
        element: &ElementHandle,
        css: &str,
    ) -> Result<Option<ElementHandle>, DriverError> {
        self.get(element)?;
        let id = element.id as usize;
        let mut chain = vec![id];
        chain.extend(self.ancestors(id));
        Ok(chain
            .into_iter()
            .find(|i| self.matches_css(*i, css))
            .map(|i| ElementHandle::new(element.root.clone(), i as u64)))
    }

    async fn is_visible(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.get(element)?.visible)
    }

    async fn tag_name(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.get(element)?.tag.to_lowercase())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.get(element)?.attrs.get(name).cloned())
    }

    async fn value(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        Ok(self.get(element)?.value.clone())
    }

    async fn inner_text(&mut self, element: &ElementHandle) -> Result<String, DriverError> {
        self.get(element)?;
        Ok(self.inner_text_of(element.id as usize))
    }

    async fn is_checked(&mut self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.get(element)?.checked)
    }

    async fn selector_for(
        &mut self,
        element: &ElementHandle,
    ) -> Result<Option<String>, DriverError> {
        let Some(id) = self.get(element)?.attr_of("id").map(str::to_string) else {
            return Ok(None);
        };
        let unique = self
            .elements
            .iter()
            .filter(|e| e.attr_of("id") == Some(id.as_str()))
            .count()
            == 1;
        Ok(unique.then(|| format!("#{}", id)))
    }

    async fn click(
        &mut self,
        element: &ElementHandle,
        options: ClickOptions,
    ) -> Result<(), DriverError> {
        let kind = if options.force { "forced" } else { "default" };
        self.calls.push(format!("click#{} {}", element.id, kind));
        let target = self.get(element)?;
        if (!options.force && target.click_blocked) || (options.force && target.force_blocked) {
            return Err(DriverError::Other(format!(
                "element #{} intercepts pointer events",
                element.id
            )));
        }
        if !options.force && !target.visible {
            return Err(DriverError::timeout(format!("click on #{}", element.id)));
        }
        self.activate(element.id as usize);
        Ok(())
    }

    async fn script_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.calls.push(format!("script_click#{}", element.id));
        if self.get(element)?.script_blocked {
            return Err(DriverError::Script("click() threw: element is disabled".into()));
        }
        self.activate(element.id as usize);
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), DriverError> {
        self.calls.push(format!("fill#{} {}", element.id, value));
        let target = self.get_mut(element)?;
        if !target.ignores_assignment {
            target.value = value.to_string();
        }
        self.focused = Some(element.id);
        Ok(())
    }

    async fn check(&mut self, element: &ElementHandle, force: bool) -> Result<(), DriverError> {
        self.calls.push(format!("check#{} force={}", element.id, force));
        let target = self.get_mut(element)?;
        if target.check_fails {
            return Err(DriverError::Other("element is not a checkbox".into()));
        }
        if target.check_needs_force && !force {
            return Ok(());
        }
        target.checked = true;
        Ok(())
    }

    async fn select_option(
        &mut self,
        element: &ElementHandle,
        option: &str,
    ) -> Result<bool, DriverError> {
        self.calls.push(format!("select#{} {}", element.id, option));
        let target = self.get_mut(element)?;
        let wanted = TextMatch::exact(option);
        match target.options.iter().find(|o| wanted.matches(o)).cloned() {
            Some(found) => {
                target.value = found;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.calls.push(format!("hover#{}", element.id));
        self.get(element)?;
        Ok(())
    }

    async fn drag_to(
        &mut self,
        source: &ElementHandle,
        target: &ElementHandle,
    ) -> Result<(), DriverError> {
        self.get(source)?;
        self.get(target)?;
        self.calls.push(format!("drag#{}->#{}", source.id, target.id));
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.get(element)?;
        Ok(())
    }

    async fn set_input_files(
        &mut self,
        element: &ElementHandle,
        files: &[PathBuf],
    ) -> Result<(), DriverError> {
        self.calls.push(format!("upload#{}", element.id));
        let target = self.get_mut(element)?;
        if target.tag != "input" || target.input_type() != "file" {
            return Err(DriverError::Script("not a file input".into()));
        }
        target.files = files.to_vec();
        Ok(())
    }

    async fn dispatch_event(
        &mut self,
        element: &ElementHandle,
        event: &str,
    ) -> Result<(), DriverError> {
        self.get(element)?;
        self.calls.push(format!("event#{} {}", element.id, event));
        Ok(())
    }

    async fn blur(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.get(element)?;
        self.calls.push(format!("blur#{}", element.id));
        self.focused = None;
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> Result<(), DriverError> {
        self.calls.push(format!("press {}", key));
        match key {
            "Control+A" | "Meta+A" => self.select_all = true,
            "Backspace" => {
                if let Some(id) = self.focused {
                    let element = &mut self.elements[id as usize];
                    if self.select_all {
                        element.value.clear();
                    } else {
                        element.value.pop();
                    }
                }
                self.select_all = false;
            }
            "Enter" => {
                let effects = std::mem::take(&mut self.enter_effects);
                self.apply(effects);
            }
            _ => {}
        }
        Ok(())
    }

    async fn type_text(&mut self, text: &str, _delay: Duration) -> Result<(), DriverError> {
        self.calls.push(format!("type {}", text));
        if let Some(id) = self.focused {
            let element = &mut self.elements[id as usize];
            if self.select_all {
                element.value.clear();
                self.select_all = false;
            }
            element.value.push_str(text);
        }
        Ok(())
    }

    async fn mouse_click(&mut self, x: f64, y: f64) -> Result<(), DriverError> {
        self.calls.push(format!("mouse {} {}", x, y));
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        self.screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn start_trace(&mut self) -> Result<(), DriverError> {
        self.calls.push("trace start".into());
        Ok(())
    }

    async fn stop_trace(&mut self, path: &Path) -> Result<(), DriverError> {
        self.trace_path = Some(path.to_path_buf());
        Ok(())
    }

    async fn drain_console(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.console)
    }

    async fn drain_network(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.network)
    }

    async fn pause(&mut self, duration: Duration) {
        self.paused += duration;
    }
}
