//! In-memory order repository for tests.

use crate::domain::{
    CustomerContact, Medicine, Order, OrderDetail, OrderItem, OrderWithItems, PLACED,
};
use crate::pricing::{ValidatedOrder, price_order};
use crate::repository::OrderRepository;
use async_trait::async_trait;
use fulfillment_core::environment::{Clock, SystemClock};
use fulfillment_core::{ServiceError, ServiceResult};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    medicines: BTreeMap<i64, Medicine>,
    users: HashMap<i64, CustomerContact>,
    orders: BTreeMap<i64, Order>,
    items: Vec<OrderItem>,
    next_order_id: i64,
    next_item_id: i64,
    offline: bool,
}

/// Order repository backed by a mutex-guarded map.
///
/// `place` holds the lock for the whole check-and-decrement, which gives it
/// the same all-or-nothing behavior as the Postgres transaction.
#[derive(Clone)]
pub struct InMemoryOrderRepository {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderRepository {
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

    /// Add or replace a catalog entry. `price` is given in cents.
    pub fn add_medicine(&self, id: i64, name: &str, price_cents: i64, stock: i32) {
        self.with_state(|state| {
            state.medicines.insert(
                id,
                Medicine {
                    id,
                    name: name.to_string(),
                    price: Decimal::new(price_cents, 2),
                    stock,
                },
            );
        });
    }

    /// Register a user's contact details.
    pub fn add_user(&self, id: i64, email: &str, name: Option<&str>) {
        self.with_state(|state| {
            state.users.insert(
                id,
                CustomerContact {
                    email: email.to_string(),
                    name: name.map(str::to_string),
                },
            );
        });
    }

    /// Current stock of a medicine.
    #[must_use]
    pub fn stock(&self, id: i64) -> Option<i32> {
        self.with_state(|state| state.medicines.get(&id).map(|m| m.stock))
    }

    /// Number of stored orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.with_state(|state| state.orders.len())
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

impl State {
    fn named_items(&self, order_id: i64) -> Vec<OrderItem> {
        self.items
            .iter()
            .filter(|item| item.order_id == order_id)
            .map(|item| OrderItem {
                medicine_name: self.medicines.get(&item.medicine_id).map(|m| m.name.clone()),
                ..item.clone()
            })
            .collect()
    }

    fn newest_first(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().rev()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn place(&self, user_id: i64, order: &ValidatedOrder) -> ServiceResult<OrderDetail> {
        let now = self.clock.now();
        self.online(|state| {
            let catalog: HashMap<i64, Medicine> = order
                .lines
                .iter()
                .filter_map(|line| state.medicines.get(&line.medicine_id))
                .map(|m| (m.id, m.clone()))
                .collect();
            let priced = price_order(order, &catalog)?;

            state.next_order_id += 1;
            let created = Order {
                id: state.next_order_id,
                user_id,
                total_amount: priced.total,
                status: PLACED.to_string(),
                delivery_address: order.address.clone(),
                created_at: now,
            };

            let mut items = Vec::with_capacity(priced.lines.len());
            for line in &priced.lines {
                if let Some(medicine) = state.medicines.get_mut(&line.medicine_id) {
                    medicine.stock -= line.quantity;
                }
                state.next_item_id += 1;
                items.push(OrderItem {
                    id: state.next_item_id,
                    order_id: created.id,
                    medicine_id: line.medicine_id,
                    quantity: line.quantity,
                    price: line.unit_price,
                    medicine_name: Some(line.name.clone()),
                });
            }

            state.orders.insert(created.id, created.clone());
            state.items.extend(items.iter().cloned());

            Ok(OrderDetail {
                order: created,
                items,
            })
        })
    }

    async fn customer_contact(&self, user_id: i64) -> ServiceResult<Option<CustomerContact>> {
        self.online(|state| Ok(state.users.get(&user_id).cloned()))
    }

    async fn list_for_user(&self, user_id: i64) -> ServiceResult<Vec<OrderWithItems>> {
        self.online(|state| {
            Ok(state
                .newest_first()
                .filter(|order| order.user_id == user_id)
                .map(|order| OrderWithItems {
                    order: order.clone(),
                    items: state.named_items(order.id),
                })
                .collect())
        })
    }

    async fn list_all(&self) -> ServiceResult<Vec<Order>> {
        self.online(|state| Ok(state.newest_first().cloned().collect()))
    }

    async fn find_for_user(
        &self,
        order_id: i64,
        user_id: i64,
    ) -> ServiceResult<Option<OrderDetail>> {
        self.online(|state| {
            Ok(state
                .orders
                .get(&order_id)
                .filter(|order| order.user_id == user_id)
                .map(|order| OrderDetail {
                    order: order.clone(),
                    items: state.named_items(order.id),
                }))
        })
    }

    async fn ping(&self) -> bool {
        self.with_state(|state| !state.offline)
    }
}
