//! The feed session: one owned context per signed-in client.
//!
//! A [`FeedSession`] owns the caches, the feed store, the notification bus
//! and the realtime connection. It is built at session start, handed to the
//! UI layer, and tears the connection down when the last handle is dropped.
//!
//! Everything runs on one thread. Methods that talk to the network spawn
//! with [`tokio::task::spawn_local`], so the session must be used inside a
//! [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use claw_shared::{ApiError, FeedView, Post, Profile, ServerEvent};

use crate::api_client::FeedApi;
use crate::bus::{NotificationBus, Subscription};
use crate::config::ClientConfig;
use crate::stores::FeedSnapshot;
use crate::sync::SyncState;
use crate::ws::{ConnectionManager, ConnectionState};

struct SessionInner {
    state: RefCell<SyncState>,
    bus: NotificationBus,
    api: Rc<dyn FeedApi>,
    connection: ConnectionManager,
    view: Cell<FeedView>,
    /// Bumped on every `load_feed`; only the latest load may replace the feed.
    feed_request: Cell<u64>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

#[derive(Clone)]
pub struct FeedSession {
    inner: Rc<SessionInner>,
}

impl FeedSession {
    pub fn new(config: &ClientConfig, api: Rc<dyn FeedApi>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<SessionInner>| {
            let weak = weak.clone();
            let connection = ConnectionManager::new(
                config.ws_url.clone(),
                config.ping_interval,
                config.reconnect.clone(),
                move |text| {
                    if let Some(inner) = weak.upgrade() {
                        FeedSession { inner }.handle_frame(text);
                    }
                },
            );

            SessionInner {
                state: RefCell::new(SyncState::new()),
                bus: NotificationBus::new(),
                api,
                connection,
                view: Cell::new(FeedView::Live),
                feed_request: Cell::new(0),
            }
        });

        Self { inner }
    }

    // --- Connection ---

    /// Open (or reopen) the realtime connection.
    pub fn connect(&self) {
        self.inner.connection.connect();
    }

    /// Close the connection and stop reconnecting. Cached state is kept.
    pub fn shutdown(&self) {
        self.inner.connection.disconnect();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.connection.reconnect_attempts()
    }

    // --- Inbound events ---

    /// Decode and apply one text frame. Unknown kinds and malformed frames
    /// are logged and dropped.
    pub fn handle_frame(&self, text: &str) {
        let decoded = ServerEvent::decode_reporting(text, |e| {
            crate::log_warn!("Skipping record: {}", e);
        });
        match decoded {
            Ok(event) => self.apply_event(event),
            Err(e) => crate::log_warn!("Ignoring frame: {}", e),
        }
    }

    /// Apply one push event, notifying subscribers once if the feed changed.
    pub fn apply_event(&self, event: ServerEvent) {
        let kind = event.kind();
        let changed = self.inner.state.borrow_mut().apply(event);
        crate::log_debug!("Applied {} (feed changed: {})", kind, changed);
        if changed {
            self.notify_all();
        }
    }

    // --- Feed snapshot and subscriptions ---

    /// Current feed, newest first. Returns the same allocation until the
    /// feed changes.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.borrow_mut().snapshot()
    }

    /// Register a listener. It is called right away with the current
    /// snapshot, then after every change.
    pub fn subscribe(&self, listener: impl Fn(&FeedSnapshot) + 'static) -> Subscription {
        let current = self.snapshot();
        self.inner.bus.subscribe(listener, &current)
    }

    pub(crate) fn notify_all(&self) {
        // The state borrow ends before listeners run so they can call back in.
        let snapshot = self.snapshot();
        self.inner.bus.publish(&snapshot);
    }

    /// Swap the whole feed, e.g. when switching views.
    pub fn replace_feed(&self, posts: Vec<Post>) {
        self.inner.state.borrow_mut().replace_feed(posts);
        self.notify_all();
    }

    pub fn get_post(&self, id: &str) -> Option<Rc<Post>> {
        self.inner.state.borrow().posts().get(id)
    }

    pub fn view(&self) -> FeedView {
        self.inner.view.get()
    }

    /// Switch to `view` and load its posts. The live view is filled by the
    /// socket, so nothing is fetched for it. A load that finishes after a
    /// newer one was started is discarded.
    pub async fn load_feed(&self, view: FeedView) -> Result<(), ApiError> {
        self.inner.view.set(view);
        let request = self.inner.feed_request.get() + 1;
        self.inner.feed_request.set(request);

        if view == FeedView::Live {
            return Ok(());
        }

        let posts = self.inner.api.fetch_feed(view).await?;
        if self.inner.feed_request.get() != request {
            crate::log_debug!("Discarding stale {:?} feed", view);
            return Ok(());
        }
        self.replace_feed(posts);
        Ok(())
    }

    // --- Profiles ---

    pub fn cached_profile(&self, username: &str) -> Option<Profile> {
        self.inner.state.borrow().profiles().get(username).cloned()
    }

    /// Return the cached profile, fetching it on first use.
    ///
    /// Two lookups racing for the same uncached name both fetch; whichever
    /// finishes last is what stays cached.
    pub async fn get_profile(&self, username: &str) -> Result<Profile, ApiError> {
        if let Some(profile) = self.cached_profile(username) {
            return Ok(profile);
        }
        let profile = self.inner.api.fetch_profile(username).await?;
        self.inner
            .state
            .borrow_mut()
            .cache_profile(username, profile.clone());
        Ok(profile)
    }

    // --- Optimistic edits ---

    /// Toggle `user`'s like locally and notify. No request is sent.
    pub fn like_optimistic(&self, post_id: &str, user: &str, currently_liked: bool) {
        let changed = self
            .inner
            .state
            .borrow_mut()
            .like_optimistic(post_id, user, currently_liked);
        if changed {
            self.notify_all();
        }
    }

    /// Remove a post locally and notify. No request is sent.
    pub fn delete_optimistic(&self, post_id: &str) {
        let changed = self.inner.state.borrow_mut().delete_optimistic(post_id);
        if changed {
            self.notify_all();
        }
    }

    // --- User actions ---

    /// Toggle a like locally, then record it with the server in the
    /// background. A failed request is logged; the local toggle stays.
    pub fn like(&self, post_id: &str, user: &str, currently_liked: bool) {
        self.like_optimistic(post_id, user, currently_liked);

        let api = self.inner.api.clone();
        let post_id = post_id.to_string();
        tokio::task::spawn_local(async move {
            if let Err(e) = api.rate(&post_id, !currently_liked).await {
                crate::log_error!("Like request for {} failed: {}", post_id, e);
            }
        });
    }

    /// Delete a post locally, then ask the server to delete it.
    pub fn delete(&self, post_id: &str) {
        self.delete_optimistic(post_id);

        let api = self.inner.api.clone();
        let post_id = post_id.to_string();
        tokio::task::spawn_local(async move {
            if let Err(e) = api.delete_post(&post_id).await {
                crate::log_error!("Delete request for {} failed: {}", post_id, e);
            }
        });
    }

    /// Follow `username` if the viewer does not yet, unfollow otherwise.
    ///
    /// The profile is fetched first if it is not cached. The cached
    /// `followed` flag and follower count change only after the server
    /// accepts; a rejected request leaves them as they were. Returns the
    /// new followed state.
    pub async fn follow_toggle(&self, username: &str) -> Result<bool, ApiError> {
        let follow = !self.get_profile(username).await?.followed;
        self.inner.api.set_following(username, follow).await?;
        self.inner.state.borrow_mut().set_followed(username, follow);
        Ok(follow)
    }

    /// Repost, then reload the current view.
    pub async fn repost(&self, post_id: &str) -> Result<(), ApiError> {
        self.inner.api.repost(post_id).await?;
        self.load_feed(self.view()).await
    }

    /// Publish a post, then reload the current view.
    pub async fn create_post(&self, content: &str, attachment: Option<&str>) -> Result<(), ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::InvalidInput("content must not be empty".to_string()));
        }
        self.inner.api.create_post(content, attachment).await?;
        self.load_feed(self.view()).await
    }

    pub async fn reply(&self, post_id: &str, content: &str) -> Result<(), ApiError> {
        if content.trim().is_empty() {
            return Err(ApiError::InvalidInput("content must not be empty".to_string()));
        }
        self.inner.api.reply(post_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_server::{wait_until, within, TestServer};
    use crate::ws::ReconnectConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::task::LocalSet;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct FakeApi {
        profiles: RefCell<HashMap<String, Profile>>,
        feeds: RefCell<HashMap<FeedView, Vec<Post>>>,
        calls: RefCell<Vec<String>>,
        fail: Cell<bool>,
    }

    impl FakeApi {
        fn record(&self, call: String) -> Result<(), ApiError> {
            self.calls.borrow_mut().push(call);
            if self.fail.get() {
                Err(ApiError::Rejected("not allowed".to_string()))
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    #[async_trait(?Send)]
    impl FeedApi for FakeApi {
        async fn fetch_profile(&self, username: &str) -> Result<Profile, ApiError> {
            self.record(format!("profile {username}"))?;
            self.profiles
                .borrow()
                .get(username)
                .cloned()
                .ok_or(ApiError::Http { status: 404, body: String::new() })
        }

        async fn fetch_feed(&self, view: FeedView) -> Result<Vec<Post>, ApiError> {
            self.record(format!("feed {view:?}"))?;
            Ok(self.feeds.borrow().get(&view).cloned().unwrap_or_default())
        }

        async fn rate(&self, post_id: &str, liked: bool) -> Result<(), ApiError> {
            self.record(format!("rate {post_id} {liked}"))
        }

        async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
            self.record(format!("delete {post_id}"))
        }

        async fn repost(&self, post_id: &str) -> Result<(), ApiError> {
            self.record(format!("repost {post_id}"))
        }

        async fn create_post(&self, content: &str, _attachment: Option<&str>) -> Result<(), ApiError> {
            self.record(format!("post {content}"))
        }

        async fn reply(&self, post_id: &str, content: &str) -> Result<(), ApiError> {
            self.record(format!("reply {post_id} {content}"))
        }

        async fn set_following(&self, username: &str, follow: bool) -> Result<(), ApiError> {
            self.record(format!("follow {username} {follow}"))
        }
    }

    fn post(id: &str, ts: i64) -> Post {
        serde_json::from_value(json!({ "id": id, "user": "bob", "timestamp": ts })).unwrap()
    }

    fn profile(name: &str, followers: u64) -> Profile {
        serde_json::from_value(json!({ "username": name, "followers": followers })).unwrap()
    }

    fn session_with(api: Rc<FakeApi>) -> FeedSession {
        FeedSession::new(&ClientConfig::default(), api)
    }

    fn counting_listener(session: &FeedSession) -> (Rc<Cell<usize>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let sub = session.subscribe(move |_| c.set(c.get() + 1));
        (count, sub)
    }

    #[test]
    fn late_subscriber_receives_current_snapshot() {
        let session = session_with(Rc::default());
        session.replace_feed(vec![post("a", 1)]);
        session.apply_event(ServerEvent::NewPost(post("b", 2)));
        session.handle_frame(r#"{"cmd":"delete_post","val":{"id":"a"}}"#);

        let received = Rc::new(RefCell::new(None));
        let r = received.clone();
        let _sub = session.subscribe(move |snapshot| *r.borrow_mut() = Some(snapshot.clone()));

        let received = received.borrow().clone().unwrap();
        assert!(received.ptr_eq(&session.snapshot()));
        assert_eq!(received.ids(), vec!["b"]);
    }

    #[test]
    fn one_notification_per_feed_changing_event() {
        let session = session_with(Rc::default());
        let (count, _sub) = counting_listener(&session);
        assert_eq!(count.get(), 1);

        session.handle_frame(
            r#"{"cmd":"posts","val":[{"id":"a","user":"u","timestamp":100},{"id":"b","user":"u","timestamp":200}]}"#,
        );
        assert_eq!(count.get(), 2);

        session.handle_frame(r#"{"cmd":"update_post","val":{"id":"b","key":"likes","data":["alice"]}}"#);
        assert_eq!(count.get(), 3);
        assert!(session.get_post("b").unwrap().is_liked_by("alice"));

        // Uncached target, ping, unknown kind and garbage: no notification.
        session.handle_frame(r#"{"cmd":"update_post","val":{"id":"zz","key":"likes","data":["alice"]}}"#);
        session.handle_frame(r#"{"cmd":"ping"}"#);
        session.handle_frame(r#"{"cmd":"wallet","val":{"credits":3}}"#);
        session.handle_frame("not json at all");
        assert_eq!(count.get(), 3);
        assert_eq!(session.snapshot().ids(), vec!["b", "a"]);
    }

    #[test]
    fn listener_may_read_the_session_while_notified() {
        let session = session_with(Rc::default());
        let seen = Rc::new(Cell::new(0));
        let (s, handle) = (seen.clone(), session.clone());
        let _sub = session.subscribe(move |snapshot| {
            assert!(snapshot.ptr_eq(&handle.snapshot()));
            s.set(snapshot.len());
        });

        session.apply_event(ServerEvent::NewPost(post("a", 1)));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let session = session_with(Rc::default());
        let (count, sub) = counting_listener(&session);
        assert!(sub.unsubscribe());
        session.replace_feed(vec![post("a", 1)]);
        assert_eq!(count.get(), 1);
    }

    #[tokio::test]
    async fn like_is_applied_before_the_request_and_kept_on_failure() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                api.fail.set(true);
                let session = session_with(api.clone());
                session.replace_feed(vec![post("a", 1)]);
                let (count, _sub) = counting_listener(&session);

                session.like("a", "u", false);
                assert!(session.snapshot()[0].is_liked_by("u"));
                assert_eq!(count.get(), 2);

                assert!(wait_until(|| api.calls() == vec!["rate a true"], WAIT).await);
                // The failed request leaves the optimistic like in place.
                assert!(session.get_post("a").unwrap().is_liked_by("u"));

                session.like("a", "u", true);
                assert!(wait_until(|| api.calls().len() == 2, WAIT).await);
                assert_eq!(api.calls()[1], "rate a false");
                assert!(session.get_post("a").unwrap().likes.is_empty());
            })
            .await;
    }

    #[tokio::test]
    async fn delete_removes_locally_then_requests() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                let session = session_with(api.clone());
                session.replace_feed(vec![post("a", 100), post("b", 200)]);

                session.delete("a");
                assert_eq!(session.snapshot().ids(), vec!["b"]);
                assert!(session.get_post("a").is_none());
                assert!(wait_until(|| api.calls() == vec!["delete a"], WAIT).await);

                // The server's own delete_post arriving afterwards changes nothing.
                let before = session.snapshot();
                session.handle_frame(r#"{"cmd":"delete_post","val":{"id":"a"}}"#);
                assert!(before.ptr_eq(&session.snapshot()));
            })
            .await;
    }

    #[tokio::test]
    async fn profiles_are_fetched_once_and_patched_by_events() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                api.profiles
                    .borrow_mut()
                    .insert("alice".to_string(), profile("alice", 5));
                let session = session_with(api.clone());

                // Not cached yet: the push is dropped.
                session.handle_frame(r#"{"cmd":"followers","val":{"username":"alice","followers":9}}"#);

                assert_eq!(session.get_profile("alice").await.unwrap().followers, 5);
                assert_eq!(session.get_profile("alice").await.unwrap().followers, 5);
                assert_eq!(api.calls(), vec!["profile alice"]);

                session.handle_frame(r#"{"cmd":"followers","val":{"username":"alice","followers":9}}"#);
                assert_eq!(session.get_profile("alice").await.unwrap().followers, 9);
                assert_eq!(api.calls().len(), 1);

                assert!(session.get_profile("nobody").await.is_err());
                assert!(session.cached_profile("nobody").is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn follow_toggle_updates_profile_after_server_accepts() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                api.profiles
                    .borrow_mut()
                    .insert("alice".to_string(), profile("alice", 5));
                let session = session_with(api.clone());

                assert!(session.follow_toggle("alice").await.unwrap());
                assert_eq!(api.calls(), vec!["profile alice", "follow alice true"]);
                let cached = session.cached_profile("alice").unwrap();
                assert!(cached.followed);
                assert_eq!(cached.followers, 6);

                assert!(!session.follow_toggle("alice").await.unwrap());
                assert_eq!(api.calls()[2], "follow alice false");
                assert_eq!(session.cached_profile("alice").unwrap().followers, 5);

                assert!(session.follow_toggle("nobody").await.is_err());
                assert!(session.cached_profile("nobody").is_none());
            })
            .await;
    }

    #[tokio::test]
    async fn rejected_follow_leaves_profile_unchanged() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                api.profiles
                    .borrow_mut()
                    .insert("al".to_string(), profile("al", 5));
                let session = session_with(api.clone());
                session.get_profile("al").await.unwrap();

                api.fail.set(true);
                assert!(matches!(
                    session.follow_toggle("al").await,
                    Err(ApiError::Rejected(_))
                ));
                assert_eq!(api.calls(), vec!["profile al", "follow al true"]);
                let cached = session.cached_profile("al").unwrap();
                assert!(!cached.followed);
                assert_eq!(cached.followers, 5);
            })
            .await;
    }

    #[test]
    fn posts_frame_keeps_good_records_when_one_is_bad() {
        let session = session_with(Rc::default());
        let (count, _sub) = counting_listener(&session);

        session.handle_frame(
            r#"{"cmd":"posts","val":[{"id":"a","user":"u","timestamp":100,"os":"x"},{"id":"b","user":"u","timestamp":200,"os":null},{"id":"c","timestamp":{}}]}"#,
        );

        assert_eq!(count.get(), 2);
        assert_eq!(session.snapshot().ids(), vec!["b", "a"]);
        assert!(session.get_post("c").is_none());
    }

    #[tokio::test]
    async fn load_feed_replaces_content_for_fetched_views() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                api.feeds
                    .borrow_mut()
                    .insert(FeedView::Top, vec![post("t1", 5), post("t2", 9)]);
                let session = session_with(api.clone());
                session.replace_feed(vec![post("live", 1)]);

                session.load_feed(FeedView::Top).await.unwrap();
                assert_eq!(session.view(), FeedView::Top);
                assert_eq!(session.snapshot().ids(), vec!["t2", "t1"]);
                // Records from the previous view stay cached.
                assert!(session.get_post("live").is_some());

                session.load_feed(FeedView::Live).await.unwrap();
                assert_eq!(api.calls(), vec!["feed Top"]);
            })
            .await;
    }

    #[tokio::test]
    async fn create_post_rejects_blank_and_reloads_view() {
        LocalSet::new()
            .run_until(async {
                let api = Rc::new(FakeApi::default());
                let session = session_with(api.clone());

                assert!(matches!(
                    session.create_post("  ", None).await,
                    Err(ApiError::InvalidInput(_))
                ));
                assert!(api.calls().is_empty());

                session.load_feed(FeedView::Latest).await.unwrap();
                session.create_post("hello", None).await.unwrap();
                assert_eq!(api.calls(), vec!["feed Latest", "post hello", "feed Latest"]);

                session.reply("p1", "hi").await.unwrap();
                session.repost("p1").await.unwrap();
                assert_eq!(api.calls()[3..], ["reply p1 hi", "repost p1", "feed Latest"]);
            })
            .await;
    }

    #[tokio::test]
    async fn pushes_over_the_socket_reach_subscribers() {
        let frames = vec![
            r#"{"cmd":"handshake","val":{}}"#.to_string(),
            r#"{"cmd":"posts","val":[{"id":"a","user":"u","timestamp":100},{"id":"b","user":"u","timestamp":200}]}"#.to_string(),
            r#"{"cmd":"new_post","val":{"id":"c","user":"u","timestamp":300}}"#.to_string(),
            r#"{"cmd":"delete_post","val":{"id":"a"}}"#.to_string(),
        ];
        let server = TestServer::start(frames, 0).await;

        LocalSet::new()
            .run_until(async {
                let config = ClientConfig {
                    ws_url: server.url.clone(),
                    reconnect: ReconnectConfig::default(),
                    ..ClientConfig::default()
                };
                let session = FeedSession::new(&config, Rc::new(FakeApi::default()));
                let snapshots = Rc::new(RefCell::new(Vec::new()));
                let s = snapshots.clone();
                let _sub = session.subscribe(move |snapshot| {
                    s.borrow_mut().push(
                        snapshot.ids().into_iter().map(String::from).collect::<Vec<_>>(),
                    )
                });

                session.connect();
                within(WAIT, async {
                    while snapshots.borrow().len() < 4 {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await;

                assert!(session.connection_state().is_open());
                assert_eq!(
                    *snapshots.borrow(),
                    vec![
                        vec![],
                        vec!["b".to_string(), "a".to_string()],
                        vec!["c".to_string(), "b".to_string(), "a".to_string()],
                        vec!["c".to_string(), "b".to_string()],
                    ]
                );

                session.shutdown();
                assert!(wait_until(
                    || session.connection_state() == ConnectionState::Disconnected,
                    WAIT
                )
                .await);
            })
            .await;
    }
}
