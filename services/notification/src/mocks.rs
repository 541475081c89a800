//! In-memory repository and recording mailer for tests.

use crate::domain::{NewNotification, Notification, NotificationKind, NotificationScope};
use crate::mailer::{MailError, Mailer, OutboundEmail};
use crate::repository::NotificationRepository;
use async_trait::async_trait;
use fulfillment_core::environment::{Clock, SystemClock};
use fulfillment_core::{ServiceError, ServiceResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct State {
    rows: Vec<Notification>,
    order_owners: HashMap<i64, i64>,
    next_id: i64,
    offline: bool,
}

/// Notification repository backed by a mutex-guarded vector.
#[derive(Clone)]
pub struct InMemoryNotificationRepository {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryNotificationRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationRepository {
    /// Empty repository stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty repository stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// Record that `user_id` placed `order_id`.
    pub fn add_order(&self, order_id: i64, user_id: i64) {
        self.lock().order_owners.insert(order_id, user_id);
    }

    /// Every stored notification, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Notification> {
        self.lock().rows.clone()
    }

    /// Simulate a storage outage: every call fails with `Internal`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn online(&self) -> ServiceResult<MutexGuard<'_, State>> {
        let guard = self.lock();
        if guard.offline {
            return Err(ServiceError::internal("database error"));
        }
        Ok(guard)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, batch: &[NewNotification]) -> ServiceResult<Vec<Notification>> {
        let now = self.clock.now();
        let mut state = self.online()?;

        let mut stored = Vec::with_capacity(batch.len());
        for new in batch {
            state.next_id += 1;
            stored.push(Notification {
                id: state.next_id,
                kind: new.kind.as_str().to_string(),
                title: new.title.clone(),
                message: new.message.clone(),
                order_id: new.order_id,
                user_id: new.scope.user_id(),
                is_read: false,
                created_at: now,
            });
        }
        state.rows.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn list(
        &self,
        kind: Option<NotificationKind>,
        scope: NotificationScope,
        limit: i64,
    ) -> ServiceResult<Vec<Notification>> {
        let state = self.online()?;
        let mut rows: Vec<Notification> = state
            .rows
            .iter()
            .filter(|n| scope.contains(n.user_id))
            .filter(|n| kind.is_none_or(|k| n.kind == k.as_str()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn mark_read(
        &self,
        id: i64,
        scope: NotificationScope,
    ) -> ServiceResult<Option<Notification>> {
        let mut state = self.online()?;
        Ok(state
            .rows
            .iter_mut()
            .find(|n| n.id == id && scope.contains(n.user_id))
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn unread_count(&self, scope: NotificationScope) -> ServiceResult<i64> {
        let state = self.online()?;
        let unread = state
            .rows
            .iter()
            .filter(|n| scope.contains(n.user_id) && !n.is_read)
            .count();
        Ok(i64::try_from(unread).unwrap_or(i64::MAX))
    }

    async fn order_owner(&self, order_id: i64) -> ServiceResult<Option<i64>> {
        Ok(self.online()?.order_owners.get(&order_id).copied())
    }

    async fn ping(&self) -> bool {
        !self.lock().offline
    }
}

/// Mailer that keeps every email it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    /// Empty mailer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make every subsequent send fail.
    pub fn set_fail(&self, fail: bool) {
        if let Ok(mut flag) = self.fail.lock() {
            *flag = fail;
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(MailError::Transport("relay unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}
