use std::sync::Arc;

use ims_client::{Gateway, GatewayConfig, PushConnector, WsConnector};
use tracing::info;

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use crate::guard::{HubNavigator, Navigation, RouteGuard, RouteTable, SIGNIN};
use crate::hub::StateHub;
use crate::notification::NotificationService;
use crate::prefs::{DarkModeStore, SidebarStore};
use crate::session::{Credentials, SessionStore, User};
use crate::sound::{AudioBackend, SoundController, TracingAudio};
use crate::storage::LocalStorage;
use crate::visibility::{retain_visible, sidebar_menu, MenuEntry};

/// The console's services, wired together.
///
/// Construction order: storage → hub → session (restored) → gateway →
/// sound → notifications → guard → preferences. The gateway takes its
/// token from the session, and its 401 hook ends the session and sends the
/// user to sign-in. Only the call that actually tore the session down
/// redirects, so a burst of 401s produces one redirect.
pub struct Console {
    config: ConsoleConfig,
    hub: Arc<StateHub>,
    session: Arc<SessionStore>,
    gateway: Arc<Gateway>,
    notifications: Arc<NotificationService>,
    guard: Arc<RouteGuard>,
    dark_mode: DarkModeStore,
    sidebar: SidebarStore,
}

impl Console {
    /// Open with on-disk storage, the websocket push channel and the
    /// logging audio backend.
    pub fn open(config: ConsoleConfig) -> Result<Self, ConsoleError> {
        let storage = LocalStorage::open(&config.storage_path())?;
        let connector = Arc::new(WsConnector::new(config.push_config()));
        Self::with_parts(config, storage, connector, Arc::new(TracingAudio))
    }

    pub fn with_parts(
        config: ConsoleConfig,
        storage: LocalStorage,
        connector: Arc<dyn PushConnector>,
        audio: Arc<dyn AudioBackend>,
    ) -> Result<Self, ConsoleError> {
        let hub = Arc::new(StateHub::new());
        let session = Arc::new(SessionStore::restore(storage.clone(), hub.clone()));
        let table = Arc::new(RouteTable::dashboard());
        let guard = Arc::new(RouteGuard::new(
            table,
            session.clone(),
            Arc::new(HubNavigator::new(hub.clone())),
            config.enforce_route_access,
            config.landing_route.clone(),
        ));

        let mut gateway_config = GatewayConfig::new(config.api_base_url.clone())
            .with_token_provider(session.clone())
            .with_timeout(config.request_timeout());
        if let Some(path) = &config.refresh_path {
            gateway_config = gateway_config.with_refresh_path(path.clone());
        }
        let hook_session = session.clone();
        let hook_guard = guard.clone();
        let gateway_config = gateway_config.on_unauthorized(move || {
            if hook_session.logout() {
                info!("session rejected by API, redirecting to sign-in");
                hook_guard.redirect(SIGNIN);
            }
        });
        let gateway = Arc::new(Gateway::new(gateway_config)?);

        let sound = Arc::new(SoundController::new(audio, config.sound_ceiling()));
        let notifications = NotificationService::new(
            gateway.clone(),
            session.clone(),
            connector,
            sound,
            hub.clone(),
            config.notifications.page_size,
            config.notifications.max_retained,
        );

        let dark_mode = DarkModeStore::load(storage.clone(), hub.clone());
        let sidebar = SidebarStore::load(storage, hub.clone());

        Ok(Self {
            config,
            hub,
            session,
            gateway,
            notifications,
            guard,
            dark_mode,
            sidebar,
        })
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<StateHub> {
        &self.hub
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn notifications(&self) -> &Arc<NotificationService> {
        &self.notifications
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn dark_mode(&self) -> &DarkModeStore {
        &self.dark_mode
    }

    pub fn sidebar(&self) -> &SidebarStore {
        &self.sidebar
    }

    /// Revalidate a restored session against the API. Returns the fresh
    /// profile, or `None` when signed out (or the session was rejected).
    pub async fn bootstrap(&self) -> Option<User> {
        if !self.session.is_authenticated() {
            return None;
        }
        self.session.fetch_current_user(&self.gateway).await
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<User, ConsoleError> {
        let user = self.session.sign_in(&self.gateway, credentials).await?;
        self.guard.redirect(&self.config.landing_route);
        Ok(user)
    }

    /// End the session locally and return to sign-in.
    pub fn sign_out(&self) {
        self.session.logout();
        self.notifications.reset();
        self.guard.redirect(SIGNIN);
    }

    pub fn navigate(&self, path: &str) -> Navigation {
        self.guard.navigate(path)
    }

    /// Sidebar entries the current session may see. Empty when signed out.
    pub fn menu(&self) -> Vec<MenuEntry> {
        let session = self.session.snapshot();
        if !session.is_authenticated() {
            return Vec::new();
        }
        retain_visible(&session, sidebar_menu(self.guard.table()))
    }
}
