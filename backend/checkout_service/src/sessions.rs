//! In-memory registry of open checkout sessions.
//!
//! Each entry pairs a [`CheckoutSession`] with the [`CheckoutSubmissionFlow`]
//! that completes it. Entries sit behind their own async mutex so one slow
//! request never blocks other sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use checkout_engine::{
    Backing, CheckoutApi, CheckoutConfig, CheckoutError, CheckoutSession, CheckoutSubmissionFlow,
    Project, Reward, SessionContext, User, NO_REWARD_ID,
};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::errors::{Result, ServiceError};

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionRequest {
    pub project: Project,
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub add_ons: Vec<Reward>,
    #[serde(default)]
    pub backing: Option<Backing>,
    #[serde(default)]
    pub user: Option<User>,
}

pub struct SessionEntry {
    pub session: CheckoutSession,
    pub flow: Arc<CheckoutSubmissionFlow>,
    failures: Arc<AtomicU32>,
}

impl SessionEntry {
    /// Submission attempts that reached the error callback.
    pub fn failed_attempts(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

pub type SharedEntry = Arc<Mutex<SessionEntry>>;

#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<u64, SharedEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session and its submission flow, and register both.
    pub async fn open(
        &self,
        request: OpenSessionRequest,
        config: &CheckoutConfig,
        api: Arc<dyn CheckoutApi>,
    ) -> (u64, SharedEntry) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let project_id = request.project.id.clone();

        let mut rewards = request.rewards;
        if !has_no_reward_tier(&rewards) {
            rewards.insert(0, Reward::no_reward(config.no_reward_minimum));
        }

        let session = CheckoutSession::new(
            request.project,
            rewards,
            request.add_ons,
            request.backing,
            SessionContext::new(request.user),
            config.clone(),
        );
        let failures = Arc::new(AtomicU32::new(0));
        let counter = failures.clone();
        let flow = CheckoutSubmissionFlow::new(
            api,
            Arc::new(move |error: &CheckoutError| {
                counter.fetch_add(1, Ordering::SeqCst);
                warn!(session_id = id, kind = ?error.kind(), "Checkout failed: {error}");
            }),
        );

        let entry = Arc::new(Mutex::new(SessionEntry {
            session,
            flow: Arc::new(flow),
            failures,
        }));
        self.sessions.write().await.insert(id, entry.clone());
        info!(session_id = id, project_id = %project_id, "Checkout session opened");
        (id, entry)
    }

    pub async fn get(&self, id: u64) -> Result<SharedEntry> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ServiceError::SessionNotFound(id))
    }

    pub async fn close(&self, id: u64) -> Result<()> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                info!(session_id = id, "Checkout session closed");
                Ok(())
            }
            None => Err(ServiceError::SessionNotFound(id)),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// True when `rewards` already carries the pledge-without-reward tier.
pub fn has_no_reward_tier(rewards: &[Reward]) -> bool {
    rewards.iter().any(|r| r.id == NO_REWARD_ID)
}
