use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use tariffsim_core::domain::conversation::{ConversationState, SessionId};
use tariffsim_core::domain::persona::Persona;

/// One live conversation. The per-session mutex serializes turns: a second
/// request for the same session waits for the in-flight turn instead of
/// interleaving generations.
pub struct SessionEntry {
    pub state: ConversationState,
    /// Set only for simulated sessions; interactive sessions speak for
    /// themselves and get no simulated customer profile.
    pub persona: Option<Persona>,
    last_activity: Instant,
}

impl SessionEntry {
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Attaches a simulated customer profile, returning a clone of the one
    /// the session ends up with.
    pub fn assign_persona(&mut self, persona: &Persona) -> Persona {
        match &self.persona {
            Some(existing) => existing.clone(),
            None => {
                self.state.persona = Some(persona.name.clone());
                self.persona = Some(persona.clone());
                persona.clone()
            }
        }
    }
}

pub type SharedSession = Arc<tokio::sync::Mutex<SessionEntry>>;

/// In-memory session registry. The outer lock guards only the map and is
/// never held across an await; per-session state lives behind its own mutex.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(max_age: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), max_age }
    }

    /// Returns the existing session for the id, or creates a fresh one.
    /// New sessions start without a persona; simulated flows assign one via
    /// [`SessionEntry::assign_persona`] before generating turns.
    pub fn get_or_create(&self, session_id: &SessionId) -> SharedSession {
        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        sessions
            .entry(session_id.as_str().to_string())
            .or_insert_with(|| {
                debug!(
                    event_name = "server.sessions.created",
                    session_id = %session_id.as_str(),
                    "new conversation session"
                );
                Arc::new(tokio::sync::Mutex::new(SessionEntry {
                    state: ConversationState::new(session_id.clone()),
                    persona: None,
                    last_activity: Instant::now(),
                }))
            })
            .clone()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<SharedSession> {
        self.sessions.read().expect("session map lock poisoned").get(session_id.as_str()).cloned()
    }

    pub fn remove(&self, session_id: &SessionId) -> Option<SharedSession> {
        self.sessions.write().expect("session map lock poisoned").remove(session_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops sessions idle longer than `max_age`. Entries whose mutex is
    /// currently held are considered active and skipped.
    pub fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        let max_age = self.max_age;
        let before = sessions.len();
        sessions.retain(|_, entry| match entry.try_lock() {
            Ok(guard) => guard.last_activity.elapsed() < max_age,
            Err(_) => true,
        });
        before - sessions.len()
    }

    /// Background eviction loop, spawned once at startup.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle();
                if evicted > 0 {
                    info!(
                        event_name = "server.sessions.evicted",
                        evicted,
                        remaining = store.len(),
                        "idle sessions evicted"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tariffsim_core::domain::conversation::SessionId;
    use tariffsim_core::domain::persona::Persona;

    use super::SessionStore;

    fn persona() -> Persona {
        Persona { name: "Max, the Commuter".to_string(), needs: "Needs data on the go.".to_string() }
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_session_id() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = SessionId("abc".to_string());

        let first = store.get_or_create(&id);
        let second = store.get_or_create(&id);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn new_sessions_start_without_a_persona() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = SessionId("interactive".to_string());

        let session = store.get_or_create(&id);
        let entry = session.lock().await;

        assert!(entry.persona.is_none());
        assert!(entry.state.persona.is_none());
    }

    #[tokio::test]
    async fn assign_persona_sets_the_profile_once() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = SessionId("simulated".to_string());

        let session = store.get_or_create(&id);
        let mut entry = session.lock().await;

        let assigned = entry.assign_persona(&persona());
        assert_eq!(assigned.name, "Max, the Commuter");
        assert_eq!(entry.state.persona.as_deref(), Some("Max, the Commuter"));

        let other = Persona { name: "Ida, the Author".to_string(), needs: "Quiet.".to_string() };
        let kept = entry.assign_persona(&other);
        assert_eq!(kept.name, "Max, the Commuter");
    }

    #[tokio::test]
    async fn evict_idle_removes_only_stale_sessions() {
        let store = SessionStore::new(Duration::from_millis(10));
        let stale = SessionId("stale".to_string());
        let fresh = SessionId("fresh".to_string());

        store.get_or_create(&stale);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh_session = store.get_or_create(&fresh);
        fresh_session.lock().await.touch();

        let evicted = store.evict_idle();

        assert_eq!(evicted, 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[tokio::test]
    async fn locked_sessions_survive_eviction() {
        let store = SessionStore::new(Duration::from_millis(0));
        let id = SessionId("busy".to_string());
        let session = store.get_or_create(&id);

        let _guard = session.lock().await;
        let evicted = store.evict_idle();

        assert_eq!(evicted, 0);
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn remove_returns_the_entry() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = SessionId("gone".to_string());
        store.get_or_create(&id);

        assert!(store.remove(&id).is_some());
        assert!(store.is_empty());
    }
}
