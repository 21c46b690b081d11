//! Session manager.
//!
//! Drives one programmatic play session per agent request through
//! `Created → Active → Ended`, settling the score exactly once.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use playgate_core::config::SessionConfig;
use playgate_core::{
    EndReason, Error, GameMeta, GameState, InputOutcome, LimitKind, ModuleStore, RateLimiter,
    Result, ScoreSink, Session, SessionPhase, Settlement,
};
use playgate_governance::track_session;
use playgate_sandbox::{InstanceMode, IsolatedInstance, SandboxHost};

/// What a new session returns to its agent.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session: Session,
    pub meta: GameMeta,
    pub state: GameState,
}

/// Owner of all programmatic play sessions.
///
/// Each session sits behind its own async mutex, so calls on one session
/// run strictly one after another while different sessions proceed in
/// parallel.
pub struct SessionManager {
    store: Arc<dyn ModuleStore>,
    host: Arc<SandboxHost>,
    limiter: Arc<dyn RateLimiter>,
    sink: Arc<dyn ScoreSink>,
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn ModuleStore>,
        host: Arc<SandboxHost>,
        limiter: Arc<dyn RateLimiter>,
        sink: Arc<dyn ScoreSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            host,
            limiter,
            sink,
            sessions: DashMap::new(),
            config,
        }
    }

    /// Start a session of `game_id` for `agent_id`.
    ///
    /// A module that fails to boot ends the session on the spot with
    /// reason `bootstrap_failed` and no settlement.
    pub async fn create_session(&self, agent_id: &str, game_id: &str) -> Result<SessionStart> {
        self.limiter
            .check_and_increment_all(
                agent_id,
                &[LimitKind::CallsPerHour, LimitKind::SessionsPerHour],
            )
            .await?;

        let record = self
            .store
            .load(game_id)
            .await?
            .ok_or_else(|| Error::GameNotFound(game_id.to_string()))?;

        let slot = Arc::new(Mutex::new(Session::new(agent_id, game_id)));
        let mut session = slot.clone().lock_owned().await;
        let session_id = session.id.clone();
        self.sessions.insert(session_id.clone(), slot);

        let options = self
            .host
            .options(InstanceMode::Stepped)
            .for_session(&session_id)
            .owned_by(agent_id);
        let instance = match self.host.instantiate(&record, options).await {
            Ok(instance) => instance,
            Err(e @ Error::BootstrapFault(_)) => {
                Self::close(&mut session, EndReason::BootstrapFailed);
                track_session("bootstrap_failed");
                tracing::warn!(session_id = %session_id, game_id, error = %e, "Session failed to boot");
                return Err(e);
            }
            Err(e) => {
                self.sessions.remove(&session_id);
                return Err(e);
            }
        };
        session.instance_id = Some(instance.id().to_string());

        match Self::boot(&instance).await {
            Ok((meta, state)) => {
                session.phase = SessionPhase::Active;
                session.last_state = Some(state.clone());
                session.updated_at = Utc::now();
                track_session("created");
                tracing::info!(
                    session_id = %session_id,
                    agent_id,
                    game_id,
                    instance_id = instance.id(),
                    "Session active"
                );
                Ok(SessionStart {
                    session: session.clone(),
                    meta,
                    state,
                })
            }
            Err(e) => {
                self.release_instance(&session).await;
                Self::close(&mut session, EndReason::BootstrapFailed);
                track_session("bootstrap_failed");
                tracing::warn!(session_id = %session_id, game_id, error = %e, "Session failed to start");
                Err(e)
            }
        }
    }

    async fn boot(instance: &IsolatedInstance) -> Result<(GameMeta, GameState)> {
        instance.start().await?;
        let meta = instance.read_meta().await?;
        let state = instance.read_state().await?;
        Ok((meta, state))
    }

    /// Send one action token and observe the resulting state.
    pub async fn send_input(
        &self,
        session_id: &str,
        agent_id: &str,
        token: &str,
    ) -> Result<InputOutcome> {
        let slot = self.slot(session_id)?;
        let mut session = slot.lock().await;
        Self::authorize(&session, agent_id)?;
        self.limiter
            .check_and_increment(agent_id, LimitKind::CallsPerHour)
            .await?;

        let instance = self.instance(&session)?;
        let accepted = instance.dispatch_input(token).await?;
        let state = instance.read_state().await?;

        session.total_inputs += 1;
        if accepted {
            session.accepted_inputs += 1;
        }
        Self::observe(&mut session, state.clone());
        tracing::debug!(session_id, token, accepted, score = state.score, "Input dispatched");
        Ok(InputOutcome { accepted, state })
    }

    /// Refresh the observed state.
    pub async fn read_state(&self, session_id: &str, agent_id: &str) -> Result<GameState> {
        let slot = self.slot(session_id)?;
        let mut session = slot.lock().await;
        Self::authorize(&session, agent_id)?;
        self.limiter
            .check_and_increment(agent_id, LimitKind::CallsPerHour)
            .await?;

        let state = self.instance(&session)?.read_state().await?;
        Self::observe(&mut session, state.clone());
        Ok(state)
    }

    /// Restart the game inside the session. The session stays active.
    pub async fn reset(&self, session_id: &str, agent_id: &str) -> Result<GameState> {
        let slot = self.slot(session_id)?;
        let mut session = slot.lock().await;
        Self::authorize(&session, agent_id)?;
        self.limiter
            .check_and_increment(agent_id, LimitKind::CallsPerHour)
            .await?;

        let instance = self.instance(&session)?;
        instance.reset().await?;
        instance.start().await?;
        let state = instance.read_state().await?;
        Self::observe(&mut session, state.clone());
        tracing::info!(session_id, "Session reset");
        Ok(state)
    }

    /// End the session, settling the last observed score.
    pub async fn end_session(&self, session_id: &str, agent_id: &str) -> Result<Settlement> {
        let slot = self.slot(session_id)?;
        let mut session = slot.lock().await;
        Self::authorize(&session, agent_id)?;
        self.limiter
            .check_and_increment(agent_id, LimitKind::CallsPerHour)
            .await?;
        self.finish(&mut session, EndReason::AgentEnded).await
    }

    /// Snapshot of a session.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        Ok(self.slot(session_id)?.lock().await.clone())
    }

    /// Sessions owned by an agent, newest first.
    pub async fn sessions_for(&self, agent_id: &str) -> Vec<Session> {
        let slots: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut owned = Vec::new();
        for slot in slots {
            let session = slot.lock().await;
            if session.agent_id == agent_id {
                owned.push(session.clone());
            }
        }
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned
    }

    /// Number of sessions not yet ended.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut count = 0;
        for slot in slots {
            if !slot.lock().await.phase.is_terminal() {
                count += 1;
            }
        }
        count
    }

    /// End and settle sessions idle for at least `max_idle`, and forget
    /// sessions that ended more than `max_idle` ago. Sessions with a call
    /// in progress are skipped. Returns how many sessions were ended.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let slots: Vec<_> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut reaped = 0;
        for (session_id, slot) in slots {
            let Ok(mut session) = slot.try_lock() else {
                continue;
            };
            if session.phase.is_terminal() {
                let ended_for = session
                    .ended_at
                    .and_then(|t| (now - t).to_std().ok())
                    .unwrap_or_default();
                if ended_for >= max_idle {
                    self.sessions.remove(&session_id);
                }
                continue;
            }
            if session.idle_for(now) < max_idle {
                continue;
            }
            match self.finish(&mut session, EndReason::IdleTimeout).await {
                Ok(_) => reaped += 1,
                Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Failed to reap idle session"),
            }
        }
        if reaped > 0 {
            tracing::info!(reaped, "Idle sessions ended");
        }
        reaped
    }

    /// Run `reap_idle` on the configured interval.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        let ttl = Duration::from_secs(self.config.idle_ttl_secs);
        let period = Duration::from_secs(self.config.reap_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                manager.reap_idle(ttl).await;
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn slot(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    fn authorize(session: &Session, agent_id: &str) -> Result<()> {
        if session.agent_id != agent_id {
            return Err(Error::NotSessionOwner(session.id.clone()));
        }
        if session.phase.is_terminal() {
            return Err(Error::TerminalStateViolation(session.id.clone()));
        }
        Ok(())
    }

    fn instance(&self, session: &Session) -> Result<Arc<IsolatedInstance>> {
        let instance_id = session
            .instance_id
            .as_deref()
            .ok_or_else(|| Error::InstanceNotFound(format!("session {}", session.id)))?;
        self.host.get(instance_id)
    }

    fn observe(session: &mut Session, state: GameState) {
        if session.phase.can_advance_to(SessionPhase::Active) {
            session.phase = SessionPhase::Active;
        }
        session.last_state = Some(state);
        session.updated_at = Utc::now();
    }

    /// Settle and end. The ledger is called first, so a failed settlement
    /// leaves the session open for another attempt.
    async fn finish(&self, session: &mut Session, reason: EndReason) -> Result<Settlement> {
        if !session.phase.can_advance_to(SessionPhase::Ended) {
            return Err(Error::TerminalStateViolation(session.id.clone()));
        }

        let settlement = Settlement {
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
            game_id: session.game_id.clone(),
            score: session.score(),
            reason,
            settled_at: Utc::now(),
        };
        self.sink.settle(&settlement).await?;

        Self::close(session, reason);
        session.settled_score = Some(settlement.score);
        self.release_instance(session).await;

        track_session(match reason {
            EndReason::IdleTimeout => "idle_timeout",
            _ => "ended",
        });
        tracing::info!(
            session_id = %session.id,
            score = settlement.score,
            reason = %reason,
            "Session ended"
        );
        Ok(settlement)
    }

    fn close(session: &mut Session, reason: EndReason) {
        let now = Utc::now();
        session.phase = SessionPhase::Ended;
        session.end_reason = Some(reason);
        session.ended_at = Some(now);
        session.updated_at = now;
    }

    async fn release_instance(&self, session: &Session) {
        if let Some(instance_id) = &session.instance_id {
            if let Err(e) = self.host.destroy(instance_id).await {
                tracing::debug!(session_id = %session.id, error = %e, "Instance already gone");
            }
        }
    }
}
