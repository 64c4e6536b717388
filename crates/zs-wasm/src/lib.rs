//! WebAssembly bindings for Zero Six
//!
//! The extension's JS shell owns `chrome.storage`, `chrome.runtime` and the
//! DOM; it hands them in as callbacks and notifications:
//!
//! - [`BackgroundRuntime`] upgrades and reconciles the stored document,
//!   mirrors changes to the native host and answers runtime messages
//! - [`SettingsStore`] reads and writes settings for the popup and options
//! - [`PageRuntime`] keeps a content script's style tree in line with the
//!   settings

mod dom;
mod extension;

use std::rc::Rc;

use js_sys::{Function, Promise};
use serde_json::{json, Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::Element;
use zs_core::schema::SITE_DEFAULTS;
use zs_core::storage::{ChangeHub, ContextId, Writer};
use zs_core::{
    site_for_host, site_for_url, Background, ChangeDistributor, Config, ElementWatcher, ListenerId, NativeBridge,
    RuleEngine, RuntimeMessage, Schema, SettingsRepository, SitePage, StorageChange, SyncOutcome, WatchHandle,
};

use crate::dom::{DocumentRoot, DocumentStyleHost};
use crate::extension::{JsStorage, JsTransport};

/// Content scripts never write the document themselves.
const PAGE_CONTEXT: ContextId = 0;
const BACKGROUND_CONTEXT: ContextId = 1;
const SETTINGS_CONTEXT: ContextId = 2;

// =============================================================================
// JSON Bridging
// =============================================================================

fn to_json(value: &JsValue) -> Result<Option<Value>, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    let text: String = js_sys::JSON::stringify(value)?.into();
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| JsValue::from_str(&format!("Invalid JSON value: {}", e)))
}

fn from_json(value: &Value) -> Result<JsValue, JsValue> {
    js_sys::JSON::parse(&value.to_string())
}

fn storage_error(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// One `chrome.storage.onChanged` entry. The platform does not name the
/// writer.
fn deliver_change(hub: &ChangeHub, key: &str, new_value: &JsValue, area_name: &str) -> Result<(), JsValue> {
    hub.deliver(&StorageChange {
        key: key.to_string(),
        old_value: None,
        new_value: to_json(new_value)?,
        area_name: area_name.to_string(),
        writer: Writer::Unknown,
    });
    Ok(())
}

fn parse_config(value: &JsValue) -> Result<Config, JsValue> {
    match to_json(value)? {
        Some(value) => Config::from_json_str(&value.to_string())
            .map_err(|e| JsValue::from_str(&format!("Failed to load config: {}", e))),
        None => Ok(Config::default()),
    }
}

// =============================================================================
// Stateless Helpers
// =============================================================================

#[wasm_bindgen]
pub fn default_settings() -> Result<JsValue, JsValue> {
    from_json(&Schema::builtin().defaults().to_value())
}

/// Normalize a stored value against the built-in schema.
#[wasm_bindgen]
pub fn merge_settings(stored: JsValue) -> Result<JsValue, JsValue> {
    let stored = to_json(&stored)?;
    from_json(&Schema::builtin().merge(stored.as_ref()).to_value())
}

/// Sites and features with their UI labels, in display order.
#[wasm_bindgen]
pub fn site_labels() -> Result<JsValue, JsValue> {
    let sites: Vec<Value> = SITE_DEFAULTS
        .iter()
        .map(|site| {
            let features: Vec<Value> = site
                .features
                .iter()
                .map(|feature| json!({"key": feature.key, "label": feature.label}))
                .collect();
            json!({"key": site.key, "label": site.label, "features": features})
        })
        .collect();
    from_json(&Value::Array(sites))
}

#[wasm_bindgen]
pub fn site_for_url_js(url: &str) -> Option<String> {
    site_for_url(url).map(|site| site.key.to_string())
}

#[wasm_bindgen]
pub fn site_for_host_js(host: &str) -> Option<String> {
    site_for_host(host).map(|site| site.key.to_string())
}

// =============================================================================
// Page Runtime
// =============================================================================

/// Cancels one `waitForElement` registration.
#[wasm_bindgen]
pub struct WaitHandle {
    handle: Option<WatchHandle>,
}

#[wasm_bindgen]
impl WaitHandle {
    /// Returns whether a pending wait was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.handle.take().is_some_and(WatchHandle::cancel)
    }
}

#[wasm_bindgen]
pub struct PageRuntime {
    schema: Rc<Schema>,
    hub: ChangeHub,
    distributor: ChangeDistributor,
    page: SitePage<DocumentStyleHost>,
    root: DocumentRoot,
    watcher: Rc<ElementWatcher<Element>>,
    watch_timeout_ms: u64,
    received: u64,
}

#[wasm_bindgen]
impl PageRuntime {
    #[wasm_bindgen(constructor)]
    pub fn new(site: &str, config: JsValue) -> Result<PageRuntime, JsValue> {
        let config = parse_config(&config)?;
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;

        let engine = RuleEngine::for_site(site, DocumentStyleHost::new(document.clone()), &config)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown site: {}", site)))?;

        let schema = Rc::new(Schema::builtin());
        let hub = ChangeHub::new();
        let distributor = ChangeDistributor::new(Rc::new(hub.clone()), schema.clone(), &config, PAGE_CONTEXT);
        let watcher = dom::element_watcher(&document)?;

        // Follow before the shell reads storage, so no change slips in
        // between its read and `start`
        let mut page = SitePage::new(engine);
        page.follow(&distributor);

        Ok(PageRuntime {
            schema,
            hub,
            distributor,
            page,
            root: DocumentRoot(document),
            watcher,
            watch_timeout_ms: config.watch_timeout_ms,
            received: 0,
        })
    }

    pub fn site(&self) -> String {
        self.page.site().to_string()
    }

    /// Apply the stored document read by the shell. A change forwarded
    /// since the runtime started following supersedes `stored`.
    /// Returns the number of active rules.
    pub fn start(&mut self, stored: JsValue) -> Result<u32, JsValue> {
        if !self.page.is_attached() {
            self.page.follow(&self.distributor);
            self.received = self.page.received();
        }

        let stored = to_json(&stored)?;
        let document = self.schema.merge(stored.as_ref());
        let active = self
            .page
            .apply_unless_changed(&document, self.received)
            .unwrap_or_else(|| self.page.active_rules().len());
        self.received = self.page.received();
        Ok(u32::try_from(active).unwrap_or(u32::MAX))
    }

    /// Forward one `chrome.storage.onChanged` entry.
    #[wasm_bindgen(js_name = storageChanged)]
    pub fn storage_changed(&self, key: &str, new_value: JsValue, area_name: &str) -> Result<(), JsValue> {
        deliver_change(&self.hub, key, &new_value, area_name)
    }

    /// Rule ids currently suppressing something on this page.
    #[wasm_bindgen(js_name = activeRules)]
    pub fn active_rules(&self) -> js_sys::Array {
        self.page
            .active_rules()
            .into_iter()
            .map(|id| JsValue::from_str(&id))
            .collect()
    }

    /// Call `callback(element)` once `selector` matches. Uses the
    /// configured timeout unless `timeout_ms` is given; 0 waits forever.
    #[wasm_bindgen(js_name = waitForElement)]
    pub fn wait_for_element(
        &self,
        selector: &str,
        callback: js_sys::Function,
        timeout_ms: Option<u32>,
    ) -> Result<WaitHandle, JsValue> {
        // Surface invalid selectors instead of waiting on them
        self.root.0.query_selector(selector)?;

        let timeout_ms = timeout_ms.map(u64::from).unwrap_or(self.watch_timeout_ms);
        let handle = self.watcher.wait_for(
            &self.root,
            selector,
            timeout_ms,
            js_sys::Date::now() as u64,
            move |element: Element| {
                if let Err(e) = callback.call1(&JsValue::NULL, &element) {
                    web_sys::console::error_1(&e);
                }
            },
        );

        if timeout_ms > 0 && self.watcher.pending() > 0 {
            dom::schedule_expiry(&self.watcher, u32::try_from(timeout_ms).unwrap_or(u32::MAX))?;
        }

        Ok(WaitHandle { handle: Some(handle) })
    }

    /// Stop following changes. Styles already injected stay in place.
    pub fn stop(&mut self) -> bool {
        self.page.detach()
    }
}

// =============================================================================
// Background Runtime
// =============================================================================

type ExtensionBackground = Background<JsStorage, JsTransport>;

fn outcome_name(outcome: &SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Synced(_) => "synced",
        SyncOutcome::NoSettings => "no-settings",
        SyncOutcome::Unavailable => "unavailable",
    }
}

/// The background service worker's settings coordinator.
#[wasm_bindgen]
pub struct BackgroundRuntime {
    background: Rc<ExtensionBackground>,
    hub: ChangeHub,
    _distributor: ChangeDistributor,
}

#[wasm_bindgen]
impl BackgroundRuntime {
    /// `storage_get(key)` and `storage_set(key, value)` wrap the settings
    /// area; `send_native(host, message)` wraps `sendNativeMessage`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        storage_get: Function,
        storage_set: Function,
        send_native: Function,
        config: JsValue,
    ) -> Result<BackgroundRuntime, JsValue> {
        let config = parse_config(&config)?;
        let schema = Rc::new(Schema::builtin());

        let repository = SettingsRepository::new(JsStorage::new(storage_get, storage_set), schema.clone(), &config);
        let bridge = NativeBridge::new(JsTransport::new(send_native), &config);
        let background = Rc::new(Background::new(repository, bridge));

        let hub = ChangeHub::new();
        let distributor = ChangeDistributor::new(Rc::new(hub.clone()), schema, &config, BACKGROUND_CONTEXT);
        background.mirror_to_native(&distributor, |task| wasm_bindgen_futures::spawn_local(task));

        Ok(BackgroundRuntime {
            background,
            hub,
            _distributor: distributor,
        })
    }

    /// Install/startup: upgrade the stored document, then pull the host's.
    /// Resolves to `"synced"`, `"no-settings"` or `"unavailable"`.
    pub fn start(&self) -> Promise {
        let background = self.background.clone();
        future_to_promise(async move {
            let outcome = background.start().await.map_err(storage_error)?;
            Ok(JsValue::from_str(outcome_name(&outcome)))
        })
    }

    /// Answer one `chrome.runtime.onMessage` request. Unknown messages are
    /// rejected synchronously so the shell can leave them to other handlers.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message: JsValue) -> Result<Promise, JsValue> {
        let message = to_json(&message)?.unwrap_or(Value::Null);
        let message: RuntimeMessage = serde_json::from_value(message)
            .map_err(|e| JsValue::from_str(&format!("Unsupported message: {}", e)))?;

        let background = self.background.clone();
        Ok(future_to_promise(async move {
            let response = background.handle_message(&message).await;
            let response = serde_json::to_value(response).map_err(storage_error)?;
            from_json(&response)
        }))
    }

    /// Forward one `chrome.storage.onChanged` entry; settings changes are
    /// mirrored to the native host.
    #[wasm_bindgen(js_name = storageChanged)]
    pub fn storage_changed(&self, key: &str, new_value: JsValue, area_name: &str) -> Result<(), JsValue> {
        deliver_change(&self.hub, key, &new_value, area_name)
    }

    #[wasm_bindgen(js_name = nativeMessagingAvailable)]
    pub fn native_messaging_available(&self) -> bool {
        self.background.bridge().is_available()
    }
}

// =============================================================================
// Settings Store
// =============================================================================

/// Settings access for the popup and options pages.
#[wasm_bindgen]
pub struct SettingsStore {
    repository: Rc<SettingsRepository<JsStorage>>,
    hub: ChangeHub,
    distributor: ChangeDistributor,
}

#[wasm_bindgen]
impl SettingsStore {
    #[wasm_bindgen(constructor)]
    pub fn new(storage_get: Function, storage_set: Function, config: JsValue) -> Result<SettingsStore, JsValue> {
        let config = parse_config(&config)?;
        let schema = Rc::new(Schema::builtin());
        let hub = ChangeHub::new();
        Ok(SettingsStore {
            distributor: ChangeDistributor::new(Rc::new(hub.clone()), schema.clone(), &config, SETTINGS_CONTEXT),
            repository: Rc::new(SettingsRepository::new(
                JsStorage::new(storage_get, storage_set),
                schema,
                &config,
            )),
            hub,
        })
    }

    /// Resolves to the complete, normalized document.
    #[wasm_bindgen(js_name = readAll)]
    pub fn read_all(&self) -> Promise {
        let repository = self.repository.clone();
        future_to_promise(async move { from_json(&repository.read_all().await.to_value()) })
    }

    /// Resolves to one site's settings; `{}` for unknown sites.
    #[wasm_bindgen(js_name = readSite)]
    pub fn read_site(&self, site: String) -> Promise {
        let repository = self.repository.clone();
        future_to_promise(async move {
            let settings = repository.read_site(&site).await;
            from_json(&Value::Object(settings.as_map().clone()))
        })
    }

    #[wasm_bindgen(js_name = writeSiteFeature)]
    pub fn write_site_feature(&self, site: String, feature: String, value: bool) -> Promise {
        let repository = self.repository.clone();
        future_to_promise(async move {
            repository
                .write_site_feature(&site, &feature, value)
                .await
                .map_err(storage_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Replace whole top-level entries (whole sites) with those of `patch`.
    #[wasm_bindgen(js_name = writePartial)]
    pub fn write_partial(&self, patch: JsValue) -> Result<Promise, JsValue> {
        let patch: Map<String, Value> = match to_json(&patch)? {
            Some(Value::Object(patch)) => patch,
            _ => return Err(JsValue::from_str("Settings patch must be an object")),
        };

        let repository = self.repository.clone();
        Ok(future_to_promise(async move {
            repository.write_partial(patch).await.map_err(storage_error)?;
            Ok(JsValue::UNDEFINED)
        }))
    }

    /// Call `callback(document)` with every new document. Returns an id
    /// for [`SettingsStore::unsubscribe`].
    pub fn subscribe(&self, callback: Function) -> f64 {
        let id = self.distributor.subscribe(move |event| {
            let delivered = from_json(&event.document.to_value())
                .and_then(|document| callback.call1(&JsValue::NULL, &document));
            if let Err(e) = delivered {
                web_sys::console::error_1(&e);
            }
        });
        u64::from(id) as f64
    }

    pub fn unsubscribe(&self, id: f64) -> bool {
        self.distributor.unsubscribe(ListenerId::from(id as u64))
    }

    /// Forward one `chrome.storage.onChanged` entry to subscribers.
    #[wasm_bindgen(js_name = storageChanged)]
    pub fn storage_changed(&self, key: &str, new_value: JsValue, area_name: &str) -> Result<(), JsValue> {
        deliver_change(&self.hub, key, &new_value, area_name)
    }
}
