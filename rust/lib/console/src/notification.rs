//! Notification client.
//!
//! Mirrors the signed-in user's recent notifications: an initial page
//! fetched over REST, then live `newNotification` events from the push
//! channel. Mutations (mark read, delete) hit the API first and only touch
//! local state once the server accepted them.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use ims_client::push::NEW_NOTIFICATION;
use ims_client::{Envelope, Gateway, PushConnector, PushSubscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ConsoleError;
use crate::hub::StateHub;
use crate::session::SessionStore;
use crate::sound::SoundController;
use crate::state::{AuthPhase, AuthState, NotificationPhase, NotificationSnapshot};

pub const NOTIFICATIONS_PATH: &str = "notifications";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    /// Also covers severities this client does not know.
    #[default]
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDirective {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

fn default_volume() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub severity: Severity,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<SoundDirective>,
}

/// `GET notifications` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPage {
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(default)]
    unread_count: u32,
}

#[derive(Default)]
struct Inner {
    phase: NotificationPhase,
    notifications: Vec<Notification>,
    unread_count: u32,
    loading: bool,
    listener: Option<JoinHandle<()>>,
    /// Bumped on every reset so in-flight initializations can tell they
    /// are stale.
    epoch: u64,
}

impl Inner {
    fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            phase: self.phase,
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
            loading: self.loading,
        }
    }
}

pub struct NotificationService {
    gateway: Arc<Gateway>,
    session: Arc<SessionStore>,
    connector: Arc<dyn PushConnector>,
    sound: Arc<SoundController>,
    hub: Arc<StateHub>,
    page_size: usize,
    max_retained: usize,
    inner: Mutex<Inner>,
}

impl NotificationService {
    /// Build the service and tie it to the session: when `auth/state`
    /// reports a signed-out session the service resets itself.
    pub fn new(
        gateway: Arc<Gateway>,
        session: Arc<SessionStore>,
        connector: Arc<dyn PushConnector>,
        sound: Arc<SoundController>,
        hub: Arc<StateHub>,
        page_size: usize,
        max_retained: usize,
    ) -> Arc<Self> {
        let service = Arc::new(Self {
            gateway,
            session,
            connector,
            sound,
            hub: hub.clone(),
            page_size,
            max_retained: max_retained.max(1),
            inner: Mutex::new(Inner::default()),
        });

        let weak = Arc::downgrade(&service);
        hub.subscribe(AuthState::PATH, move |_, value| {
            let signed_out = value
                .downcast_ref::<AuthState>()
                .is_some_and(|s| s.phase == AuthPhase::Unauthenticated);
            if !signed_out {
                return;
            }
            if let Some(service) = weak.upgrade() {
                if service.phase() != NotificationPhase::Uninitialized {
                    service.reset();
                }
            }
        });
        service.publish();
        service
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.lock().snapshot()
    }

    pub fn phase(&self) -> NotificationPhase {
        self.lock().phase
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn unread_count(&self) -> u32 {
        self.lock().unread_count
    }

    /// Connect the push channel and load the first page.
    ///
    /// Does nothing when already initialized (or initializing) or when no
    /// signed-in user with an id is loaded. Returns whether the service is
    /// initialized afterwards.
    pub async fn initialize(self: &Arc<Self>) -> bool {
        let user_id = match self.session.user_id() {
            Some(id) if self.session.is_authenticated() => id,
            _ => {
                debug!("no signed-in user, skipping notification setup");
                return false;
            }
        };
        let epoch = {
            let mut inner = self.lock();
            if inner.phase != NotificationPhase::Uninitialized {
                return inner.phase == NotificationPhase::Initialized;
            }
            inner.phase = NotificationPhase::Initializing;
            inner.epoch
        };
        self.publish();

        let subscription = match self.connector.connect(&user_id).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!("push channel unavailable: {}", e);
                self.abandon(epoch);
                return false;
            }
        };
        let listener = tokio::spawn(listen(Arc::downgrade(self), subscription));
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                listener.abort();
                return false;
            }
            inner.listener = Some(listener);
        }

        if let Err(e) = self.fetch_notifications(self.page_size).await {
            warn!("initial notification fetch failed: {}", e);
            self.abandon(epoch);
            return false;
        }

        let initialized = {
            let mut inner = self.lock();
            if inner.epoch == epoch {
                inner.phase = NotificationPhase::Initialized;
                true
            } else {
                false
            }
        };
        if initialized {
            info!(user = %user_id, "notifications initialized");
            self.publish();
        }
        initialized
    }

    /// Roll a failed initialization back to `uninitialized`, unless a reset
    /// already did.
    fn abandon(&self, epoch: u64) {
        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            if let Some(listener) = inner.listener.take() {
                listener.abort();
            }
            inner.phase = NotificationPhase::Uninitialized;
        }
        self.publish();
    }

    /// Replace the local list and counter with the server's latest page.
    /// On failure nothing but the loading flag is touched.
    pub async fn fetch_notifications(&self, limit: usize) -> Result<(), ConsoleError> {
        self.set_loading(true);
        let result = self
            .gateway
            .get_json::<Envelope<NotificationPage>>(NOTIFICATIONS_PATH, &[("limit", limit.to_string())])
            .await;
        match result {
            Ok(Envelope { data: page }) => {
                {
                    let mut inner = self.lock();
                    let mut notifications = page.notifications;
                    notifications.truncate(self.max_retained);
                    inner.notifications = notifications;
                    inner.unread_count = page.unread_count;
                    inner.loading = false;
                }
                self.publish();
                Ok(())
            }
            Err(e) => {
                warn!("failed to fetch notifications: {}", e);
                self.set_loading(false);
                Err(e.into())
            }
        }
    }

    /// Prepend a pushed notification and play its sound.
    pub fn add_notification(&self, notification: Notification) {
        debug!(id = %notification.id, "notification received");
        {
            let mut inner = self.lock();
            if !notification.is_read {
                inner.unread_count = inner.unread_count.saturating_add(1);
            }
            inner.notifications.insert(0, notification.clone());
            let max = self.max_retained;
            inner.notifications.truncate(max);
        }
        self.publish();
        self.play_sound_for_notification(&notification);
    }

    pub fn play_sound_for_notification(&self, notification: &Notification) {
        self.sound.play(notification.sound.as_ref());
    }

    /// Mark one notification read. Ids not in the local list are ignored
    /// without a request.
    pub async fn mark_as_read(&self, id: &str) -> Result<(), ConsoleError> {
        if !self.lock().notifications.iter().any(|n| n.id == id) {
            debug!(id, "mark_as_read: unknown notification");
            return Ok(());
        }
        self.gateway
            .patch_json::<_, Value>(&format!("{}/{}/read", NOTIFICATIONS_PATH, id), &serde_json::json!({}))
            .await
            .map_err(|e| log_failure("mark notification read", e))?;
        {
            let mut inner = self.lock();
            let mut newly_read = false;
            if let Some(n) = inner.notifications.iter_mut().find(|n| n.id == id) {
                newly_read = !n.is_read;
                n.is_read = true;
            }
            if newly_read {
                inner.unread_count = inner.unread_count.saturating_sub(1);
            }
        }
        self.publish();
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<(), ConsoleError> {
        self.gateway
            .patch_json::<_, Value>(&format!("{}/read-all", NOTIFICATIONS_PATH), &serde_json::json!({}))
            .await
            .map_err(|e| log_failure("mark all notifications read", e))?;
        {
            let mut inner = self.lock();
            for n in inner.notifications.iter_mut() {
                n.is_read = true;
            }
            inner.unread_count = 0;
        }
        self.publish();
        Ok(())
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), ConsoleError> {
        self.gateway
            .delete_json::<Value>(&format!("{}/{}", NOTIFICATIONS_PATH, id))
            .await
            .map_err(|e| log_failure("delete notification", e))?;
        {
            let mut inner = self.lock();
            if let Some(index) = inner.notifications.iter().position(|n| n.id == id) {
                let removed = inner.notifications.remove(index);
                if !removed.is_read {
                    inner.unread_count = inner.unread_count.saturating_sub(1);
                }
            }
        }
        self.publish();
        Ok(())
    }

    pub async fn delete_all_read(&self) -> Result<(), ConsoleError> {
        self.gateway
            .delete_json::<Value>(&format!("{}/read", NOTIFICATIONS_PATH))
            .await
            .map_err(|e| log_failure("delete read notifications", e))?;
        self.lock().notifications.retain(|n| !n.is_read);
        self.publish();
        Ok(())
    }

    /// Drop all local state and close the push channel.
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            if let Some(listener) = inner.listener.take() {
                listener.abort();
            }
            let epoch = inner.epoch.wrapping_add(1);
            *inner = Inner { epoch, ..Inner::default() };
        }
        self.sound.stop();
        debug!("notifications reset");
        self.publish();
    }

    fn set_loading(&self, loading: bool) {
        self.lock().loading = loading;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.lock().snapshot();
        self.hub.set(NotificationSnapshot::PATH, snapshot);
    }
}

fn log_failure(action: &str, e: ims_client::ApiError) -> ConsoleError {
    warn!("{} failed: {}", action, e);
    e.into()
}

/// Push listener: one task per initialized service, events handled in
/// arrival order.
async fn listen(service: Weak<NotificationService>, mut subscription: PushSubscription) {
    while let Some(event) = subscription.next_event().await {
        if event.event != NEW_NOTIFICATION {
            continue;
        }
        let Some(service) = service.upgrade() else {
            break;
        };
        match parse_pushed(event.data) {
            Ok(notification) => service.add_notification(notification),
            Err(e) => warn!("unreadable pushed notification: {}", e),
        }
    }
    debug!("push listener stopped");
}

/// Pushed payloads are `{ "notification": {...} }`; a bare notification is
/// accepted too.
fn parse_pushed(data: Value) -> Result<Notification, serde_json::Error> {
    match data {
        Value::Object(mut map) if map.contains_key("notification") => {
            serde_json::from_value(map.remove("notification").unwrap_or(Value::Null))
        }
        other => serde_json::from_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, patch};
    use axum::{Json, Router};
    use ims_client::{ApiError, GatewayConfig, PushEvent};
    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::sound::testing::RecordingAudio;
    use crate::storage::LocalStorage;

    // =====================================================================
    // Fakes
    // =====================================================================

    /// API double. `fail` makes every route answer 500.
    #[derive(Clone, Default)]
    struct Api {
        fail: Arc<std::sync::atomic::AtomicBool>,
        requests: Arc<AtomicUsize>,
    }

    impl Api {
        fn failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn hit(&self) -> Result<(), StatusCode> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            } else {
                Ok(())
            }
        }
    }

    async fn start_api(api: Api) -> String {
        let app = Router::new()
            .route(
                "/api/notifications",
                get(|State(api): State<Api>| async move {
                    api.hit().map(|_| Json(json!({ "data": {
                        "notifications": [
                            { "_id": "n1", "title": "Low stock", "message": "SKU-9 below reorder point",
                              "type": "warning", "isRead": false, "createdAt": "2025-07-01T08:00:00Z" },
                            { "_id": "n2", "title": "Sale", "message": "INV-22 paid",
                              "type": "success", "isRead": true, "createdAt": "2025-07-01T07:00:00Z" }
                        ],
                        "unreadCount": 1
                    }})))
                }),
            )
            .route(
                "/api/notifications/read-all",
                patch(|State(api): State<Api>| async move { api.hit().map(|_| Json(json!({}))) }),
            )
            .route(
                "/api/notifications/read",
                delete(|State(api): State<Api>| async move { api.hit().map(|_| Json(json!({}))) }),
            )
            .route(
                "/api/notifications/:id/read",
                patch(|State(api): State<Api>, Path(_id): Path<String>| async move {
                    api.hit().map(|_| Json(json!({})))
                }),
            )
            .route(
                "/api/notifications/:id",
                delete(|State(api): State<Api>, Path(_id): Path<String>| async move {
                    api.hit().map(|_| StatusCode::NO_CONTENT)
                }),
            )
            .with_state(api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    /// Push connector handing out detached subscriptions.
    #[derive(Default)]
    struct FakePush {
        feed: Mutex<Option<mpsc::UnboundedSender<PushEvent>>>,
        connects: AtomicUsize,
        refuse: bool,
    }

    impl FakePush {
        fn push(&self, data: Value) {
            let feed = self.feed.lock().unwrap();
            feed.as_ref().unwrap().send(PushEvent::new(NEW_NOTIFICATION, data)).unwrap();
        }
    }

    #[async_trait::async_trait]
    impl PushConnector for FakePush {
        async fn connect(&self, _user_id: &str) -> Result<PushSubscription, ApiError> {
            if self.refuse {
                return Err(ApiError::Channel("refused".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let (sub, feed, _sent) = PushSubscription::detached();
            *self.feed.lock().unwrap() = Some(feed);
            Ok(sub)
        }
    }

    struct Fixture {
        api: Api,
        push: Arc<FakePush>,
        audio: Arc<RecordingAudio>,
        session: Arc<SessionStore>,
        hub: Arc<StateHub>,
        service: Arc<NotificationService>,
    }

    async fn fixture_with(push: FakePush, max_retained: usize) -> Fixture {
        let api = Api::default();
        let base = start_api(api.clone()).await;
        let hub = Arc::new(StateHub::new());
        let session = Arc::new(SessionStore::new(LocalStorage::in_memory(), hub.clone()));
        session.set_token("jwt");
        session.set_user(serde_json::from_value(json!({"_id": "u1", "role": "staff"})).unwrap());

        let gateway = Arc::new(
            Gateway::new(GatewayConfig::new(base).with_token_provider(session.clone())).unwrap(),
        );
        let push = Arc::new(push);
        let audio = Arc::new(RecordingAudio::default());
        let sound = Arc::new(SoundController::new(audio.clone(), Duration::from_secs(5)));
        let service = NotificationService::new(
            gateway,
            session.clone(),
            push.clone(),
            sound,
            hub.clone(),
            10,
            max_retained,
        );
        Fixture { api, push, audio, session, hub, service }
    }

    async fn fixture() -> Fixture {
        fixture_with(FakePush::default(), 100).await
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    // =====================================================================
    // Initialization
    // =====================================================================

    #[tokio::test]
    async fn initialize_connects_and_fetches() {
        let f = fixture().await;
        assert!(f.service.initialize().await);
        assert_eq!(f.service.phase(), NotificationPhase::Initialized);
        assert_eq!(f.service.notifications().len(), 2);
        assert_eq!(f.service.unread_count(), 1);
        assert_eq!(f.service.notifications()[0].severity, Severity::Warning);

        // Second call is a no-op.
        assert!(f.service.initialize().await);
        assert_eq!(f.push.connects.load(Ordering::SeqCst), 1);

        let published = f.hub.get::<NotificationSnapshot>(NotificationSnapshot::PATH).unwrap();
        assert_eq!(published.unread_count, 1);
        assert_eq!(published.phase, NotificationPhase::Initialized);
    }

    #[tokio::test]
    async fn initialize_without_user_is_noop() {
        let f = fixture().await;
        f.session.logout();
        assert!(!f.service.initialize().await);
        assert_eq!(f.push.connects.load(Ordering::SeqCst), 0);
        assert_eq!(f.api.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_initial_fetch_rolls_back() {
        let f = fixture().await;
        f.api.failing(true);
        assert!(!f.service.initialize().await);
        assert_eq!(f.service.phase(), NotificationPhase::Uninitialized);

        f.api.failing(false);
        assert!(f.service.initialize().await);
        assert_eq!(f.push.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refused_push_channel_rolls_back() {
        let f = fixture_with(FakePush { refuse: true, ..Default::default() }, 100).await;
        assert!(!f.service.initialize().await);
        assert_eq!(f.service.phase(), NotificationPhase::Uninitialized);
    }

    // =====================================================================
    // Push events
    // =====================================================================

    #[tokio::test]
    async fn pushed_notification_is_prepended_counted_and_sounded() {
        let f = fixture().await;
        f.service.initialize().await;

        f.push.push(json!({ "notification": {
            "_id": "n3", "title": "New order", "type": "info", "isRead": false,
            "sound": { "enabled": true }
        }}));
        wait_for(|| f.service.notifications().len() == 3).await;

        assert_eq!(f.service.notifications()[0].id, "n3");
        assert_eq!(f.service.unread_count(), 2);
        assert_eq!(f.audio.calls(), vec!["beep 800 1000ms"]);
    }

    #[tokio::test]
    async fn read_push_does_not_bump_counter() {
        let f = fixture().await;
        f.service.initialize().await;
        f.push.push(json!({ "notification": { "_id": "n4", "isRead": true } }));
        wait_for(|| f.service.notifications().len() == 3).await;
        assert_eq!(f.service.unread_count(), 1);
        assert!(f.audio.calls().is_empty());
    }

    #[tokio::test]
    async fn list_is_bounded_without_touching_counter() {
        let f = fixture_with(FakePush::default(), 2).await;
        f.service.initialize().await;
        f.push.push(json!({ "notification": { "_id": "n5", "isRead": false } }));
        wait_for(|| f.service.unread_count() == 2).await;

        let ids: Vec<String> = f.service.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["n5", "n1"]);
    }

    // =====================================================================
    // Mutations
    // =====================================================================

    #[tokio::test]
    async fn mark_as_read_updates_after_success() {
        let f = fixture().await;
        f.service.initialize().await;
        f.service.mark_as_read("n1").await.unwrap();
        assert!(f.service.notifications()[0].is_read);
        assert_eq!(f.service.unread_count(), 0);

        // Already read: request goes out, counter stays.
        f.service.mark_as_read("n1").await.unwrap();
        assert_eq!(f.service.unread_count(), 0);
    }

    #[tokio::test]
    async fn mark_as_read_unknown_id_is_noop() {
        let f = fixture().await;
        f.service.initialize().await;
        let before = f.api.requests.load(Ordering::SeqCst);

        f.service.mark_as_read("missing").await.unwrap();
        assert_eq!(f.api.requests.load(Ordering::SeqCst), before);
        assert_eq!(f.service.unread_count(), 1);
    }

    #[tokio::test]
    async fn failed_mutations_leave_state_alone() {
        let f = fixture().await;
        f.service.initialize().await;
        let before = f.service.snapshot();
        f.api.failing(true);

        assert!(f.service.mark_as_read("n1").await.is_err());
        assert!(f.service.mark_all_as_read().await.is_err());
        assert!(f.service.delete_notification("n1").await.is_err());
        assert!(f.service.delete_all_read().await.is_err());
        assert!(f.service.fetch_notifications(10).await.is_err());

        assert_eq!(f.service.snapshot(), before);
    }

    #[tokio::test]
    async fn mark_all_and_delete() {
        let f = fixture().await;
        f.service.initialize().await;

        f.service.delete_notification("n1").await.unwrap();
        assert_eq!(f.service.unread_count(), 0);
        assert_eq!(f.service.notifications().len(), 1);

        f.service.fetch_notifications(10).await.unwrap();
        f.service.mark_all_as_read().await.unwrap();
        assert_eq!(f.service.unread_count(), 0);
        assert!(f.service.notifications().iter().all(|n| n.is_read));

        f.service.delete_all_read().await.unwrap();
        assert!(f.service.notifications().is_empty());
    }

    // =====================================================================
    // Reset
    // =====================================================================

    #[tokio::test]
    async fn logout_resets_service() {
        let f = fixture().await;
        f.service.initialize().await;
        assert_eq!(f.service.notifications().len(), 2);

        f.session.logout();
        assert_eq!(f.service.phase(), NotificationPhase::Uninitialized);
        assert!(f.service.notifications().is_empty());
        assert_eq!(f.service.unread_count(), 0);
    }

    #[test]
    fn notification_wire_format() {
        let n: Notification = serde_json::from_value(json!({
            "_id": "n1", "title": "t", "message": "m", "type": "critical",
            "isRead": false, "createdAt": "2025-07-10T12:00:00.000Z",
            "relatedModel": "Product", "relatedId": "p1",
            "sound": { "enabled": true, "src": "/a.mp3", "loop": true }
        }))
        .unwrap();
        assert_eq!(n.severity, Severity::Info);
        assert_eq!(n.related_model.as_deref(), Some("Product"));
        let sound = n.sound.unwrap();
        assert!(sound.looping);
        assert_eq!(sound.volume, 1.0);
        assert!(n.created_at.is_some());

        let bare = parse_pushed(json!({"id": "x"})).unwrap();
        assert_eq!(bare.id, "x");
    }
}
