//! web-sys backends for the core's page abstractions

use std::rc::{Rc, Weak};

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, Document, Element, MutationObserver, MutationObserverInit, Node};
use zs_core::{ElementQuery, ElementWatcher, MutationSource, StyleHost};

/// The live page's style tree.
pub struct DocumentStyleHost {
    document: Document,
}

impl DocumentStyleHost {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn insert_style(&self, id: &str, css: &str) -> Result<(), JsValue> {
        let style = self.document.create_element("style")?;
        style.set_id(id);
        style.set_text_content(Some(css));

        let parent: Node = match self.document.head() {
            Some(head) => head.into(),
            None => self
                .document
                .document_element()
                .ok_or_else(|| JsValue::from_str("Document has no root element"))?
                .into(),
        };
        parent.append_child(&style)?;
        Ok(())
    }
}

impl StyleHost for DocumentStyleHost {
    fn style_text(&self, id: &str) -> Option<String> {
        self.document.get_element_by_id(id)?.text_content()
    }

    fn write_style(&mut self, id: &str, css: &str) {
        if let Some(existing) = self.document.get_element_by_id(id) {
            existing.set_text_content(Some(css));
            return;
        }
        if let Err(e) = self.insert_style(id, css) {
            console::warn_1(&e);
        }
    }

    fn remove_style(&mut self, id: &str) -> bool {
        match self.document.get_element_by_id(id) {
            Some(element) => {
                element.remove();
                true
            }
            None => false,
        }
    }

    fn style_ids(&self, prefix: &str) -> Vec<String> {
        let selector = format!("style[id^=\"{prefix}\"]");
        let Ok(nodes) = self.document.query_selector_all(&selector) else {
            return Vec::new();
        };
        (0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .map(|element| element.id())
            .collect()
    }
}

/// Selector lookups against the whole document.
pub struct DocumentRoot(pub Document);

impl ElementQuery for DocumentRoot {
    type Element = Element;

    fn query_selector(&self, selector: &str) -> Option<Element> {
        self.0.query_selector(selector).ok().flatten()
    }
}

/// Subtree mutations of the document, through one `MutationObserver`.
pub struct DomMutationSource {
    observer: MutationObserver,
    target: Node,
    _callback: Closure<dyn FnMut()>,
}

impl MutationSource for DomMutationSource {
    fn connect(&self) {
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        if let Err(e) = self.observer.observe_with_options(&self.target, &init) {
            console::warn_1(&e);
        }
    }

    fn disconnect(&self) {
        self.observer.disconnect();
    }
}

/// An element watcher fed by the document's own mutation stream.
pub fn element_watcher(document: &Document) -> Result<Rc<ElementWatcher<Element>>, JsValue> {
    let slot: Rc<std::cell::RefCell<Weak<ElementWatcher<Element>>>> = Rc::default();

    let callback_slot = slot.clone();
    let root = DocumentRoot(document.clone());
    let callback = Closure::<dyn FnMut()>::new(move || {
        let watcher = callback_slot.borrow().upgrade();
        if let Some(watcher) = watcher {
            watcher.on_mutations(&root);
        }
    });

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    let watcher = Rc::new(ElementWatcher::new(DomMutationSource {
        observer,
        target: document.clone().into(),
        _callback: callback,
    }));
    *slot.borrow_mut() = Rc::downgrade(&watcher);
    Ok(watcher)
}

/// Expire due waits once `timeout_ms` has passed. Timers may fire early,
/// so the expiry re-arms itself for the next deadline while waits remain.
pub fn schedule_expiry(watcher: &Rc<ElementWatcher<Element>>, timeout_ms: u32) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;
    let weak = Rc::downgrade(watcher);
    let expire = Closure::once_into_js(move || {
        if let Some(watcher) = weak.upgrade() {
            expire_due(&watcher);
        }
    });
    window.set_timeout_with_callback_and_timeout_and_arguments_0(
        expire.unchecked_ref(),
        i32::try_from(timeout_ms).unwrap_or(i32::MAX),
    )?;
    Ok(())
}

fn expire_due(watcher: &Rc<ElementWatcher<Element>>) {
    let Some(delay) = watcher.expire_and_next(js_sys::Date::now() as u64) else {
        return;
    };
    if let Err(e) = schedule_expiry(watcher, u32::try_from(delay).unwrap_or(u32::MAX)) {
        console::warn_1(&e);
    }
}
