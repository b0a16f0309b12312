//! UI preferences: dark mode and sidebar state.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::hub::StateHub;
use crate::state::{DarkMode, SidebarState};
use crate::storage::{keys, LocalStorage};

pub const DEFAULT_SELECTED: &str = "eCommerce";
pub const DEFAULT_PAGE: &str = "Dashboard";

/// Dark mode flag, persisted under `darkMode` as a JSON boolean.
pub struct DarkModeStore {
    enabled: Mutex<bool>,
    storage: LocalStorage,
    hub: Arc<StateHub>,
}

impl DarkModeStore {
    /// Load the stored flag. Absent or unreadable means off.
    pub fn load(storage: LocalStorage, hub: Arc<StateHub>) -> Self {
        let enabled = storage.get_json::<bool>(keys::DARK_MODE).unwrap_or(false);
        hub.set(DarkMode::PATH, DarkMode(enabled));
        Self { enabled: Mutex::new(enabled), storage, hub }
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, enabled: bool) {
        *self.enabled.lock().unwrap_or_else(|e| e.into_inner()) = enabled;
        if let Err(e) = self.storage.set_json(keys::DARK_MODE, &enabled) {
            warn!("failed to save dark mode preference: {}", e);
        }
        self.hub.set(DarkMode::PATH, DarkMode(enabled));
    }

    /// Flip the flag; returns the new value.
    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set(enabled);
        enabled
    }
}

/// Sidebar selection and page (persisted) plus open/full-screen flags
/// (memory only).
pub struct SidebarStore {
    state: Mutex<SidebarState>,
    storage: LocalStorage,
    hub: Arc<StateHub>,
}

impl SidebarStore {
    pub fn load(storage: LocalStorage, hub: Arc<StateHub>) -> Self {
        let state = SidebarState {
            selected: storage
                .get_json(keys::SELECTED)
                .unwrap_or_else(|| DEFAULT_SELECTED.to_string()),
            page: storage
                .get_json(keys::PAGE)
                .unwrap_or_else(|| DEFAULT_PAGE.to_string()),
            is_open: false,
            is_full_screen: false,
        };
        hub.set(SidebarState::PATH, state.clone());
        Self { state: Mutex::new(state), storage, hub }
    }

    fn lock(&self) -> MutexGuard<'_, SidebarState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SidebarState {
        self.lock().clone()
    }

    pub fn toggle(&self) -> bool {
        let open = {
            let mut state = self.lock();
            state.is_open = !state.is_open;
            state.is_open
        };
        self.publish();
        open
    }

    /// Entering full screen also closes the sidebar.
    pub fn set_full_screen(&self, full_screen: bool) {
        {
            let mut state = self.lock();
            state.is_full_screen = full_screen;
            if full_screen {
                state.is_open = false;
            }
        }
        self.publish();
    }

    pub fn select(&self, selected: &str) {
        if let Err(e) = self.storage.set_json(keys::SELECTED, selected) {
            warn!("failed to save sidebar selection: {}", e);
        }
        self.lock().selected = selected.to_string();
        self.publish();
    }

    pub fn set_page(&self, page: &str) {
        if let Err(e) = self.storage.set_json(keys::PAGE, page) {
            warn!("failed to save sidebar page: {}", e);
        }
        self.lock().page = page.to_string();
        self.publish();
    }

    fn publish(&self) {
        let state = self.state();
        self.hub.set(SidebarState::PATH, state);
    }
}
