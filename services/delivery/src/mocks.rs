//! In-memory delivery repository for tests.

use crate::domain::{Created, Delivery, TransitionPolicy, UNKNOWN_ADDRESS};
use crate::repository::DeliveryRepository;
use async_trait::async_trait;
use fulfillment_core::environment::{Clock, SystemClock};
use fulfillment_core::{DeliveryStatus, ServiceError, ServiceResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    deliveries: BTreeMap<i64, Delivery>,
    next_id: i64,
    offline: bool,
}

impl State {
    fn insert(
        &mut self,
        order_id: i64,
        status: DeliveryStatus,
        address: &str,
        courier: &str,
        clock: &dyn Clock,
    ) -> Delivery {
        self.next_id += 1;
        let delivery = Delivery {
            id: self.next_id,
            order_id,
            status,
            address: address.to_string(),
            courier: courier.to_string(),
            updated_at: clock.now(),
        };
        self.deliveries.insert(order_id, delivery.clone());
        delivery
    }
}

/// Delivery repository keyed by order id, like the unique index in Postgres.
#[derive(Clone)]
pub struct InMemoryDeliveryRepository {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDeliveryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDeliveryRepository {
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

    /// Number of delivery rows.
    #[must_use]
    pub fn count(&self) -> usize {
        self.with_state(|state| state.deliveries.len())
    }

    /// Simulate a storage outage: every call fails with `Internal`.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn online<T>(&self, f: impl FnOnce(&mut State) -> ServiceResult<T>) -> ServiceResult<T> {
        self.with_state(|state| {
            if state.offline {
                Err(ServiceError::internal("database error"))
            } else {
                f(state)
            }
        })
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryDeliveryRepository {
    async fn create_pending(
        &self,
        order_id: i64,
        address: &str,
        courier: &str,
    ) -> ServiceResult<Created> {
        let clock = Arc::clone(&self.clock);
        self.online(|state| {
            if let Some(existing) = state.deliveries.get_mut(&order_id) {
                if existing.address_unknown() {
                    existing.address = address.to_string();
                    existing.updated_at = clock.now();
                }
                return Ok(Created::Existing(existing.clone()));
            }
            Ok(Created::New(state.insert(
                order_id,
                DeliveryStatus::Pending,
                address,
                courier,
                clock.as_ref(),
            )))
        })
    }

    async fn set_status(
        &self,
        order_id: i64,
        status: DeliveryStatus,
        policy: TransitionPolicy,
        courier: &str,
    ) -> ServiceResult<Delivery> {
        let clock = Arc::clone(&self.clock);
        self.online(|state| {
            if let Some(existing) = state.deliveries.get_mut(&order_id) {
                policy.check(existing.status, status)?;
                existing.status = status;
                existing.updated_at = clock.now();
                return Ok(existing.clone());
            }
            Ok(state.insert(order_id, status, UNKNOWN_ADDRESS, courier, clock.as_ref()))
        })
    }

    async fn find(&self, order_id: i64) -> ServiceResult<Option<Delivery>> {
        self.online(|state| Ok(state.deliveries.get(&order_id).cloned()))
    }

    async fn ping(&self) -> bool {
        self.with_state(|state| !state.offline)
    }
}
