//! The external surface the orchestrator drives but does not own.
//!
//! A surface is any asynchronously mutating UI that can be queried
//! synchronously: elements are looked up by role-tagged selector sets,
//! checked for actionability, triggered, and watched until they go away.
//! The orchestrator never caches a [`Handle`] across steps; it re-locates
//! controls on every check because the surface may re-render at any time.

pub mod sim;

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Opaque reference to an element's current representation in the surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single unit selected for bulk deletion.
///
/// `marker` is the handle captured at selection time (e.g. the row's
/// selection checkbox). It is only used to tell whether the item is still
/// listed; the live row is re-resolved through [`Surface::resolve`] at the
/// start of every sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub marker: Handle,
}

impl Item {
    pub fn new(id: impl Into<String>, marker: Handle) -> Self {
        Self {
            id: id.into(),
            marker,
        }
    }
}

/// The controls a deletion sequence interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Control {
    /// The per-item action-menu button.
    MenuTrigger,
    /// The transient layer menus and dialogs render into.
    Overlay,
    /// "Delete" entry inside the opened menu.
    DeleteControl,
    /// Final confirmation button in the dialog.
    ConfirmControl,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Self::MenuTrigger => "menu control",
            Self::Overlay => "overlay",
            Self::DeleteControl => "delete control",
            Self::ConfirmControl => "confirm control",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Candidate selectors for one control, tried in order by the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub control: Control,
    pub candidates: Vec<String>,
}

impl SelectorSet {
    pub fn new<I, S>(control: Control, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            control,
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Selector sets for every control the sequence touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSelectors {
    pub menu_trigger: SelectorSet,
    pub overlay: SelectorSet,
    pub delete_control: SelectorSet,
    pub confirm_control: SelectorSet,
}

impl Default for ControlSelectors {
    fn default() -> Self {
        Self {
            menu_trigger: SelectorSet::new(Control::MenuTrigger, default_menu_trigger()),
            overlay: SelectorSet::new(Control::Overlay, default_overlay()),
            delete_control: SelectorSet::new(Control::DeleteControl, default_delete_control()),
            confirm_control: SelectorSet::new(Control::ConfirmControl, default_confirm_control()),
        }
    }
}

pub fn default_menu_trigger() -> Vec<String> {
    [
        r#"button[data-test-id="actions-menu-button"]"#,
        r#"button[aria-label*="actions"]"#,
        r#"button[aria-label*="menu"]"#,
        "button.menu-button",
        "button.actions-button",
    ]
    .map(String::from)
    .to_vec()
}

pub fn default_overlay() -> Vec<String> {
    [
        "div.cdk-overlay-container",
        r#"[role="dialog"]"#,
        ".modal-container",
        ".overlay-container",
    ]
    .map(String::from)
    .to_vec()
}

pub fn default_delete_control() -> Vec<String> {
    [
        r#"button[data-test-id="delete-button"]"#,
        r#"button[aria-label*="delete"]"#,
        r#"button:contains("Delete")"#,
        "button.delete-btn",
    ]
    .map(String::from)
    .to_vec()
}

pub fn default_confirm_control() -> Vec<String> {
    [
        r#"button[data-test-id="confirm-button"]"#,
        r#"button:contains("Delete")"#,
        r#"button:contains("Confirm")"#,
        r#"button[aria-label*="confirm"]"#,
        "button.confirm-btn",
    ]
    .map(String::from)
    .to_vec()
}

/// Interaction kinds the sequence fires at a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Click / press.
    Activate,
}

/// Capabilities the integration layer must supply.
///
/// Every method is a single-shot, non-blocking query or fire-and-forget
/// interaction; all waiting happens in the poller.
pub trait Surface: Send + Sync {
    /// Re-resolve the live row for `item`. `None` means the surface no
    /// longer renders anything for it.
    fn resolve(&self, item: &Item) -> Option<Handle>;

    /// Look up the first element matching `selectors`, optionally inside
    /// `scope`.
    fn locate(&self, selectors: &SelectorSet, scope: Option<&Handle>) -> Option<Handle>;

    /// Present, visibly rendered and enabled.
    fn is_actionable(&self, handle: &Handle) -> bool;

    /// Fire an interaction. Errors mean the interaction could not be
    /// dispatched at all.
    fn trigger(&self, handle: &Handle, action: ActionKind) -> Result<()>;

    /// Still attached and rendered. Used for disappearance polling.
    fn still_present(&self, handle: &Handle) -> bool;

    /// Best-effort neutral gesture (e.g. Escape) that closes stuck overlays.
    fn dispatch_dismiss(&self) -> Result<()>;

    /// Clear the operator's selection once a batch is torn down.
    fn clear_selection(&self) -> Result<()> {
        Ok(())
    }
}
