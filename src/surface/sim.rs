//! Scripted in-memory surface.
//!
//! Models a selectable list whose rows open an action menu into a shared
//! overlay, show a confirmation dialog, and animate out after confirmation.
//! Each row carries a [`RowBehavior`] so scenarios can script the failure
//! modes a real surface exhibits (missing controls, disabled buttons, rows
//! that never leave). Scenarios are loaded from YAML:
//!
//! ```yaml
//! items:
//!   - id: chat-1
//!   - id: chat-2
//!     behavior: delete-disabled
//!   - id: chat-3
//!     removal_delay_ms: 400
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use super::{ActionKind, Control, Handle, Item, SelectorSet, Surface};

const OVERLAY_HANDLE: &str = "overlay";

/// Scripted behaviour of one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowBehavior {
    #[default]
    Normal,
    /// Removed by something else before the batch reaches it.
    VanishBeforeStart,
    /// Still listed, but the live row cannot be resolved.
    Unresolvable,
    /// The row renders without its action-menu button.
    NoMenuButton,
    /// The menu opens without a delete entry.
    DeleteMissing,
    /// The delete entry renders disabled.
    DeleteDisabled,
    /// Clicking delete never produces a confirmation button.
    ConfirmMissing,
    /// The row stays on screen after confirmation.
    NeverDisappears,
    /// Dispatching the menu click fails outright.
    TriggerError,
}

fn default_selected() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimRow {
    pub id: String,
    #[serde(default = "default_selected")]
    pub selected: bool,
    #[serde(default)]
    pub behavior: RowBehavior,
    /// How long the menu takes to render its entries after opening.
    #[serde(default)]
    pub menu_delay_ms: u64,
    /// How long the row animates out after confirmation.
    #[serde(default)]
    pub removal_delay_ms: u64,
}

impl SimRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selected: default_selected(),
            behavior: RowBehavior::Normal,
            menu_delay_ms: 0,
            removal_delay_ms: 0,
        }
    }

    pub fn with_behavior(mut self, behavior: RowBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_menu_delay_ms(mut self, ms: u64) -> Self {
        self.menu_delay_ms = ms;
        self
    }

    pub fn with_removal_delay_ms(mut self, ms: u64) -> Self {
        self.removal_delay_ms = ms;
        self
    }

    pub fn unselected(mut self) -> Self {
        self.selected = false;
        self
    }
}

/// A scenario file: the rows of the simulated list, in display order.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub items: Vec<SimRow>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let scenario: Scenario = serde_yaml::from_str(contents)?;
        let mut seen = std::collections::HashSet::new();
        for row in &scenario.items {
            if !seen.insert(row.id.as_str()) {
                bail!("duplicate item id '{}'", row.id);
            }
        }
        Ok(scenario)
    }

    pub fn into_surface(self) -> SimulatedSurface {
        SimulatedSurface::new(self.items)
    }
}

/// One interaction the surface received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub item: String,
    pub control: Control,
}

#[derive(Debug)]
struct RowState {
    row: SimRow,
    listed: bool,
    removal_started: Option<Instant>,
}

impl RowState {
    fn removed(&self) -> bool {
        self.removal_started
            .is_some_and(|at| at.elapsed() >= Duration::from_millis(self.row.removal_delay_ms))
    }
}

#[derive(Debug, Default)]
struct SimState {
    rows: Vec<RowState>,
    menu: Option<(usize, Instant)>,
    dialog: Option<usize>,
    triggers: Vec<TriggerRecord>,
    dismissals: usize,
    selection_cleared: bool,
    gestures_fail: bool,
}

impl SimState {
    fn index_of(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.row.id == id)
    }

    fn menu_entries_ready(&self, idx: usize) -> bool {
        matches!(self.menu, Some((open, at))
            if open == idx
                && at.elapsed() >= Duration::from_millis(self.rows[idx].row.menu_delay_ms))
    }

    /// Whether the element behind `handle` is currently rendered.
    fn exists(&self, handle: &Handle) -> bool {
        if handle.as_str() == OVERLAY_HANDLE {
            return self.menu.is_some() || self.dialog.is_some();
        }
        let Some((kind, id)) = handle.as_str().split_once(':') else {
            return false;
        };
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let row = &self.rows[idx];
        match kind {
            "select" => row.listed && !row.removed(),
            "row" => !row.removed(),
            "menu" => !row.removed() && row.row.behavior != RowBehavior::NoMenuButton,
            "delete" => {
                self.menu_entries_ready(idx) && row.row.behavior != RowBehavior::DeleteMissing
            }
            "confirm" => {
                self.dialog == Some(idx) && row.row.behavior != RowBehavior::ConfirmMissing
            }
            _ => false,
        }
    }
}

/// Deterministic stand-in for a real UI, safe to share across threads.
#[derive(Debug)]
pub struct SimulatedSurface {
    state: Mutex<SimState>,
}

impl SimulatedSurface {
    pub fn new(rows: Vec<SimRow>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| RowState {
                listed: row.behavior != RowBehavior::VanishBeforeStart,
                row,
                removal_started: None,
            })
            .collect();
        Self {
            state: Mutex::new(SimState {
                rows,
                ..SimState::default()
            }),
        }
    }

    /// Make the dismiss and clear-selection gestures fail without effect.
    pub fn with_failing_gestures(self) -> Self {
        self.state().gestures_fail = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Items whose rows are selected, in display order.
    pub fn selected_items(&self) -> Vec<Item> {
        self.state()
            .rows
            .iter()
            .filter(|r| r.row.selected)
            .map(|r| Item::new(r.row.id.clone(), Handle::new(format!("select:{}", r.row.id))))
            .collect()
    }

    /// Every interaction dispatched so far, oldest first.
    pub fn trigger_log(&self) -> Vec<TriggerRecord> {
        self.state().triggers.clone()
    }

    pub fn dismissals(&self) -> usize {
        self.state().dismissals
    }

    pub fn selection_cleared(&self) -> bool {
        self.state().selection_cleared
    }

    /// Ids of rows that have finished animating out.
    pub fn removed_ids(&self) -> Vec<String> {
        self.state()
            .rows
            .iter()
            .filter(|r| r.removed())
            .map(|r| r.row.id.clone())
            .collect()
    }

    /// Remove a row immediately, as if another client deleted it.
    pub fn remove_now(&self, id: &str) {
        let mut state = self.state();
        if let Some(idx) = state.index_of(id) {
            let row = &mut state.rows[idx];
            row.row.removal_delay_ms = 0;
            row.removal_started = Some(Instant::now());
        }
    }
}

impl Surface for SimulatedSurface {
    fn resolve(&self, item: &Item) -> Option<Handle> {
        let state = self.state();
        let idx = state.index_of(&item.id)?;
        let row = &state.rows[idx];
        if row.removed() || row.row.behavior == RowBehavior::Unresolvable {
            return None;
        }
        Some(Handle::new(format!("row:{}", row.row.id)))
    }

    fn locate(&self, selectors: &SelectorSet, scope: Option<&Handle>) -> Option<Handle> {
        let state = self.state();
        let candidate = match selectors.control {
            Control::Overlay => Handle::new(OVERLAY_HANDLE),
            Control::MenuTrigger => {
                let id = scope?.as_str().strip_prefix("row:")?;
                Handle::new(format!("menu:{id}"))
            }
            Control::DeleteControl => {
                let (idx, _) = state.menu?;
                Handle::new(format!("delete:{}", state.rows[idx].row.id))
            }
            Control::ConfirmControl => {
                let idx = state.dialog?;
                Handle::new(format!("confirm:{}", state.rows[idx].row.id))
            }
        };
        let scope_rendered = scope.is_none_or(|s| state.exists(s));
        (scope_rendered && state.exists(&candidate)).then_some(candidate)
    }

    fn is_actionable(&self, handle: &Handle) -> bool {
        let state = self.state();
        if !state.exists(handle) {
            return false;
        }
        match handle.as_str().split_once(':') {
            Some(("delete", id)) => state
                .index_of(id)
                .is_some_and(|idx| state.rows[idx].row.behavior != RowBehavior::DeleteDisabled),
            _ => true,
        }
    }

    fn trigger(&self, handle: &Handle, action: ActionKind) -> Result<()> {
        let mut state = self.state();
        let Some((kind, id)) = handle.as_str().split_once(':') else {
            bail!("cannot {action:?} '{handle}': not an interactive element");
        };
        let Some(idx) = state.index_of(id) else {
            bail!("cannot {action:?} '{handle}': element is detached");
        };
        let behavior = state.rows[idx].row.behavior;
        let control = match kind {
            "menu" => {
                if behavior == RowBehavior::TriggerError {
                    bail!("click on '{handle}' was not dispatched");
                }
                state.menu = Some((idx, Instant::now()));
                state.dialog = None;
                Control::MenuTrigger
            }
            "delete" => {
                state.menu = None;
                state.dialog = Some(idx);
                Control::DeleteControl
            }
            "confirm" => {
                state.dialog = None;
                if behavior != RowBehavior::NeverDisappears {
                    state.rows[idx].removal_started = Some(Instant::now());
                }
                Control::ConfirmControl
            }
            _ => bail!("cannot {action:?} '{handle}': not an interactive element"),
        };
        debug!(item = id, control = %control, "simulated trigger");
        state.triggers.push(TriggerRecord {
            item: id.to_string(),
            control,
        });
        Ok(())
    }

    fn still_present(&self, handle: &Handle) -> bool {
        self.state().exists(handle)
    }

    fn dispatch_dismiss(&self) -> Result<()> {
        let mut state = self.state();
        if state.gestures_fail {
            bail!("escape was not delivered");
        }
        state.menu = None;
        state.dialog = None;
        state.dismissals += 1;
        Ok(())
    }

    fn clear_selection(&self) -> Result<()> {
        let mut state = self.state();
        if state.gestures_fail {
            bail!("selection could not be cleared");
        }
        for row in &mut state.rows {
            row.row.selected = false;
        }
        state.selection_cleared = true;
        Ok(())
    }
}
