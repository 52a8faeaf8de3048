//! Shared test fixtures: an in-memory multiplexer and a scripted identity source

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use kodegen_agent_deck::{
    DeckError, DeckOptions, ExternalSessionId, IdentitySource, InstanceId, InstanceRecord,
    LaunchSpec, Multiplexer, MuxSessionInfo, MuxSessionName, RefreshRequest, Result, Status,
    StatusScheduler, Tool,
};
use parking_lot::Mutex;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// FAKE MULTIPLEXER
// ============================================================================

type AttachHook = Arc<dyn Fn(&FakeMultiplexer, &str) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub content: String,
    pub dead: bool,
    pub spec: Option<LaunchSpec>,
}

#[derive(Default)]
struct FakeState {
    sessions: BTreeMap<String, FakeSession>,
    unavailable: bool,
    fail_create: bool,
    fail_capture: HashSet<String>,
    panic_capture: HashSet<String>,
    captures: Vec<String>,
    sent: Vec<(String, String)>,
    killed: Vec<String>,
    created: Vec<LaunchSpec>,
    piped: Vec<(String, PathBuf)>,
    attach_hook: Option<AttachHook>,
    attach_delay: Duration,
    capture_delay: Duration,
    late_capture: Option<Duration>,
}

/// In-memory stand-in for tmux
#[derive(Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeState>,
}

impl FakeMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a live session showing `content`
    pub fn add_session(&self, name: &str, content: &str) {
        self.state.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                content: content.to_string(),
                ..FakeSession::default()
            },
        );
    }

    pub fn set_content(&self, name: &str, content: &str) {
        if let Some(session) = self.state.lock().sessions.get_mut(name) {
            session.content = content.to_string();
        }
    }

    pub fn set_dead(&self, name: &str) {
        if let Some(session) = self.state.lock().sessions.get_mut(name) {
            session.dead = true;
        }
    }

    /// Remove a session behind the deck's back
    pub fn remove_session(&self, name: &str) {
        self.state.lock().sessions.remove(name);
    }

    pub fn has(&self, name: &str) -> bool {
        self.state.lock().sessions.contains_key(name)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn fail_capture(&self, name: &str) {
        self.state.lock().fail_capture.insert(name.to_string());
    }

    pub fn panic_capture(&self, name: &str) {
        self.state.lock().panic_capture.insert(name.to_string());
    }

    pub fn on_attach(
        &self,
        delay: Duration,
        hook: impl Fn(&FakeMultiplexer, &str) + Send + Sync + 'static,
    ) {
        let mut state = self.state.lock();
        state.attach_hook = Some(Arc::new(hook));
        state.attach_delay = delay;
    }

    /// Make every capture take `delay`
    pub fn set_capture_delay(&self, delay: Duration) {
        self.state.lock().capture_delay = delay;
    }

    /// Make the next capture read the pane right away but return after `delay`
    pub fn delay_next_capture(&self, delay: Duration) {
        self.state.lock().late_capture = Some(delay);
    }

    /// Session names in capture order
    pub fn captures(&self) -> Vec<String> {
        self.state.lock().captures.clone()
    }

    pub fn clear_captures(&self) {
        self.state.lock().captures.clear();
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.state.lock().sent.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().killed.clone()
    }

    pub fn created(&self) -> Vec<LaunchSpec> {
        self.state.lock().created.clone()
    }

    pub fn piped(&self) -> Vec<(String, PathBuf)> {
        self.state.lock().piped.clone()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.state.lock().unavailable {
            return Err(DeckError::availability("fake multiplexer is down"));
        }
        Ok(())
    }

    fn ensure_session(&self, name: &MuxSessionName) -> Result<()> {
        self.ensure_available()?;
        if self.state.lock().sessions.contains_key(name.as_str()) {
            Ok(())
        } else {
            Err(DeckError::session_missing(name.as_str()))
        }
    }
}

impl Multiplexer for FakeMultiplexer {
    async fn check_available(&self) -> Result<()> {
        self.ensure_available()
    }

    async fn create_session(&self, spec: &LaunchSpec) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(DeckError::command("new-session refused"));
        }
        if state.sessions.contains_key(spec.name.as_str()) {
            return Err(DeckError::command(format!("duplicate session: {}", spec.name)));
        }
        state.created.push(spec.clone());
        state.sessions.insert(
            spec.name.as_str().to_string(),
            FakeSession {
                content: String::new(),
                dead: false,
                spec: Some(spec.clone()),
            },
        );
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<MuxSessionInfo>> {
        self.ensure_available()?;
        Ok(self
            .state
            .lock()
            .sessions
            .iter()
            .map(|(name, session)| MuxSessionInfo {
                name: MuxSessionName::new(name.clone()),
                pane_dead: session.dead,
                activity: None,
            })
            .collect())
    }

    async fn capture_pane(&self, name: &MuxSessionName) -> Result<String> {
        self.ensure_available()?;
        let late = self.state.lock().late_capture.take();
        if let Some(delay) = late {
            let snapshot = {
                let mut state = self.state.lock();
                state.captures.push(name.as_str().to_string());
                state.sessions.get(name.as_str()).map(|s| s.content.clone())
            };
            tokio::time::sleep(delay).await;
            return snapshot.ok_or_else(|| DeckError::session_missing(name.as_str()));
        }
        let delay = self.state.lock().capture_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.captures.push(name.as_str().to_string());
        if state.panic_capture.contains(name.as_str()) {
            drop(state);
            panic!("capture of {name} exploded");
        }
        if state.fail_capture.contains(name.as_str()) {
            return Err(DeckError::command(format!("capture of {name} failed")));
        }
        state
            .sessions
            .get(name.as_str())
            .map(|s| s.content.clone())
            .ok_or_else(|| DeckError::session_missing(name.as_str()))
    }

    async fn send_text(&self, name: &MuxSessionName, text: &str) -> Result<()> {
        self.ensure_session(name)?;
        let mut state = self.state.lock();
        state.sent.push((name.as_str().to_string(), text.to_string()));
        if let Some(session) = state.sessions.get_mut(name.as_str()) {
            session.content.push_str(text);
        }
        Ok(())
    }

    async fn send_enter(&self, name: &MuxSessionName) -> Result<()> {
        self.ensure_session(name)?;
        if let Some(session) = self.state.lock().sessions.get_mut(name.as_str()) {
            session.content.push('\n');
        }
        Ok(())
    }

    async fn kill_session(&self, name: &MuxSessionName) -> Result<()> {
        self.ensure_session(name)?;
        let mut state = self.state.lock();
        state.sessions.remove(name.as_str());
        state.killed.push(name.as_str().to_string());
        Ok(())
    }

    async fn attach(&self, name: &MuxSessionName) -> Result<()> {
        self.ensure_session(name)?;
        let (hook, delay) = {
            let state = self.state.lock();
            (state.attach_hook.clone(), state.attach_delay)
        };
        if let Some(hook) = hook {
            hook(self, name.as_str());
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn pipe_to_log(&self, name: &MuxSessionName, log_file: &Path) -> Result<()> {
        self.ensure_session(name)?;
        self.state
            .lock()
            .piped
            .push((name.as_str().to_string(), log_file.to_path_buf()));
        Ok(())
    }
}

// ============================================================================
// SCRIPTED IDENTITY SOURCE
// ============================================================================

/// Announces whatever the test pushes, for every tool and project
#[derive(Default)]
pub struct ScriptedIdentitySource {
    announced: Mutex<Vec<ExternalSessionId>>,
}

impl ScriptedIdentitySource {
    pub fn new(initial: &[&str]) -> Arc<Self> {
        let source = Self::default();
        for id in initial {
            source.announce(id);
        }
        Arc::new(source)
    }

    pub fn announce(&self, id: &str) {
        self.announced.lock().push(ExternalSessionId::new(id));
    }
}

impl IdentitySource for ScriptedIdentitySource {
    fn announced(&self, _tool: Tool, _project_path: &Path) -> Result<Vec<ExternalSessionId>> {
        Ok(self.announced.lock().clone())
    }
}

// ============================================================================
// BUILDERS AND HELPERS
// ============================================================================

/// Fast timings rooted in `dir`
pub fn options(dir: &Path) -> DeckOptions {
    DeckOptions::builder()
        .data_dir(dir)
        .home_dir(dir.join("home"))
        .batch_size(2)
        .identity_timeout(Duration::from_millis(300))
        .identity_poll_interval(Duration::from_millis(10))
        .readiness_timeout(Duration::from_millis(200))
        .readiness_poll_interval(Duration::from_millis(10))
        .activity_debounce(Duration::from_millis(10))
        .tick_interval(Duration::from_millis(20))
        .shell_command("bash")
        .build()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0)
        .single()
        .expect("valid timestamp")
}

/// Record of a tracked instance, created `created` seconds after a fixed epoch
pub fn record(
    id: &str,
    session: Option<&str>,
    external: Option<&str>,
    created: i64,
) -> InstanceRecord {
    InstanceRecord {
        id: InstanceId::new(id),
        title: id.to_string(),
        project_path: PathBuf::from("/work/project"),
        tool: Tool::Claude,
        status: Status::Idle,
        external_session_id: external.map(ExternalSessionId::new),
        mux_session: session.map(MuxSessionName::new),
        fingerprint: None,
        acknowledged: false,
        needs_identity: external.is_none(),
        created_at: at(created),
        last_accessed_at: at(created),
        group_path: String::new(),
    }
}

/// Trigger one batch and wait until the worker finished it
pub async fn refresh_once<M: Multiplexer>(scheduler: &StatusScheduler<M>, request: RefreshRequest) {
    let mut completed = scheduler.subscribe();
    let before = *completed.borrow_and_update();
    assert!(scheduler.trigger_refresh(request), "trigger dropped");
    tokio::time::timeout(Duration::from_secs(5), completed.wait_for(|n| *n > before))
        .await
        .expect("batch did not finish in time")
        .expect("worker stopped");
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
