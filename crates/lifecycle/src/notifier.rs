// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use cbx_config::NotificationConfig;
use std::{
    collections::VecDeque,
    fmt::{self, Display},
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPhase {
    Pending,
    Success,
    Error,
}

impl Display for StatusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusPhase::Pending => "pending",
            StatusPhase::Success => "success",
            StatusPhase::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub phase: StatusPhase,
    pub message: String,
    pub expires_at: Instant,
}

impl Notification {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct NotifierState {
    entries: VecDeque<Notification>,
    next_id: u64,
}

/// Bounded FIFO of user-facing status messages, each expiring on its own timer.
///
/// This is a display affordance only. Entries can be dropped when the queue is
/// full, so nothing here is suitable for auditing.
#[derive(Clone)]
pub struct StatusNotifier {
    state: Arc<Mutex<NotifierState>>,
    config: NotificationConfig,
}

impl StatusNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState::default())),
            config: NotificationConfig {
                capacity: config.capacity.max(1),
                ..config
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().expect("Poisoned lock in StatusNotifier")
    }

    fn ttl(&self, phase: StatusPhase) -> Duration {
        match phase {
            StatusPhase::Pending => self.config.pending_ttl(),
            StatusPhase::Success => self.config.success_ttl(),
            StatusPhase::Error => self.config.error_ttl(),
        }
    }

    fn log(phase: StatusPhase, message: &str) {
        match phase {
            StatusPhase::Error => error!(status = %phase, "{message}"),
            _ => info!(status = %phase, "{message}"),
        }
    }

    /// Post a standalone notification
    pub fn notify(&self, phase: StatusPhase, message: impl Into<String>) -> NotificationId {
        let message = message.into();
        Self::log(phase, &message);
        let now = Instant::now();
        let expires_at = now + self.ttl(phase);

        let mut state = self.lock();
        state.entries.retain(|n| n.is_live(now));
        if state.entries.len() >= self.config.capacity {
            if let Some(dropped) = state.entries.pop_front() {
                warn!(dropped = %dropped.message, "Notification queue full, dropping oldest entry");
            }
        }
        let id = NotificationId(state.next_id);
        state.next_id += 1;
        state.entries.push_back(Notification {
            id,
            phase,
            message,
            expires_at,
        });
        id
    }

    /// Start a pending notification owned by one operation
    pub fn begin(&self, message: impl Into<String>) -> OperationStatus {
        let id = self.notify(StatusPhase::Pending, message);
        OperationStatus {
            notifier: self.clone(),
            id,
        }
    }

    /// Rewrite an entry in place, re-posting it if it already expired or was dropped
    fn replace(&self, id: NotificationId, phase: StatusPhase, message: String) -> NotificationId {
        let now = Instant::now();
        let expires_at = now + self.ttl(phase);
        {
            let mut state = self.lock();
            if let Some(entry) = state
                .entries
                .iter_mut()
                .find(|n| n.id == id && n.is_live(now))
            {
                Self::log(phase, &message);
                entry.phase = phase;
                entry.message = message;
                entry.expires_at = expires_at;
                return id;
            }
        }
        self.notify(phase, message)
    }

    /// Most recently posted live notification
    pub fn current(&self) -> Option<Notification> {
        let now = Instant::now();
        self.lock()
            .entries
            .iter()
            .rev()
            .find(|n| n.is_live(now))
            .cloned()
    }

    /// All live notifications, oldest first
    pub fn live(&self) -> Vec<Notification> {
        let now = Instant::now();
        self.lock()
            .entries
            .iter()
            .filter(|n| n.is_live(now))
            .cloned()
            .collect()
    }
}

/// Handle to the pending notification of a single operation.
/// Updates only ever touch this operation's own entry.
pub struct OperationStatus {
    notifier: StatusNotifier,
    id: NotificationId,
}

impl OperationStatus {
    pub fn id(&self) -> NotificationId {
        self.id
    }

    pub fn update(&mut self, message: impl Into<String>) {
        self.id = self
            .notifier
            .replace(self.id, StatusPhase::Pending, message.into());
    }

    pub fn succeed(self, message: impl Into<String>) -> NotificationId {
        self.notifier
            .replace(self.id, StatusPhase::Success, message.into())
    }

    pub fn fail(self, message: impl Into<String>) -> NotificationId {
        self.notifier
            .replace(self.id, StatusPhase::Error, message.into())
    }
}
