//! Request validation, pricing and stock checks.
//!
//! Pure functions shared by the Postgres and in-memory repositories, so both
//! reject exactly the same orders with exactly the same messages.

use crate::domain::{LineRequest, Medicine, PlaceOrderRequest};
use fulfillment_core::{ServiceError, ServiceResult};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Shortest accepted delivery address, after trimming.
pub const MIN_ADDRESS_LEN: usize = 5;

/// One requested line after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    /// Medicine id
    pub medicine_id: i64,
    /// Units, always positive
    pub quantity: i32,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    /// Lines in request order, unique by medicine
    pub lines: Vec<OrderLine>,
    /// Trimmed delivery address
    pub address: String,
}

impl ValidatedOrder {
    /// Medicine ids referenced by the order, in request order.
    #[must_use]
    pub fn medicine_ids(&self) -> Vec<i64> {
        self.lines.iter().map(|line| line.medicine_id).collect()
    }
}

/// A line priced against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    /// Medicine id
    pub medicine_id: i64,
    /// Medicine name at purchase time
    pub name: String,
    /// Units
    pub quantity: i32,
    /// Unit price at purchase time
    pub unit_price: Decimal,
}

impl PricedLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// An order whose every line is known and in stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    /// Priced lines in request order
    pub lines: Vec<PricedLine>,
    /// Sum of line totals, two decimal places
    pub total: Decimal,
}

/// Check the shape of a place-order request.
///
/// # Errors
///
/// Returns [`ServiceError::Validation`] naming the first offending field:
/// no items, a non-positive or non-numeric id or quantity, a repeated
/// medicine id, or an address shorter than [`MIN_ADDRESS_LEN`].
pub fn validate(request: &PlaceOrderRequest) -> ServiceResult<ValidatedOrder> {
    if request.items.is_empty() {
        return Err(ServiceError::validation("items must not be empty"));
    }

    let mut seen = HashSet::with_capacity(request.items.len());
    let mut lines = Vec::with_capacity(request.items.len());

    for (index, item) in request.items.iter().enumerate() {
        let line = validate_line(index, item)?;
        if !seen.insert(line.medicine_id) {
            return Err(ServiceError::validation(format!(
                "duplicate medicineId {}",
                line.medicine_id
            )));
        }
        lines.push(line);
    }

    let address = request.address.trim();
    if address.chars().count() < MIN_ADDRESS_LEN {
        return Err(ServiceError::validation(format!(
            "address must be at least {MIN_ADDRESS_LEN} characters"
        )));
    }

    Ok(ValidatedOrder {
        lines,
        address: address.to_string(),
    })
}

fn validate_line(index: usize, item: &LineRequest) -> ServiceResult<OrderLine> {
    let medicine_id = positive_integer(&item.medicine_id).ok_or_else(|| {
        ServiceError::validation(format!("items[{index}].medicineId must be a positive integer"))
    })?;

    let quantity = positive_integer(&item.quantity)
        .and_then(|q| i32::try_from(q).ok())
        .ok_or_else(|| {
            ServiceError::validation(format!("items[{index}].quantity must be a positive integer"))
        })?;

    Ok(OrderLine {
        medicine_id,
        quantity,
    })
}

/// Accept `7` and `"7"`; reject fractions, zero, negatives and anything else.
fn positive_integer(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| *n > 0)
}

/// Price `order` against the locked catalog rows.
///
/// Unknown ids are reported before any stock shortage; both checks walk the
/// lines in request order.
///
/// # Errors
///
/// Returns [`ServiceError::Conflict`] with `medicine {id} not found` or
/// `insufficient stock for medicine {id}`.
pub fn price_order(
    order: &ValidatedOrder,
    catalog: &HashMap<i64, Medicine>,
) -> ServiceResult<PricedOrder> {
    if let Some(missing) = order
        .lines
        .iter()
        .find(|line| !catalog.contains_key(&line.medicine_id))
    {
        return Err(ServiceError::conflict(format!(
            "medicine {} not found",
            missing.medicine_id
        )));
    }

    let mut lines = Vec::with_capacity(order.lines.len());
    for line in &order.lines {
        let Some(medicine) = catalog.get(&line.medicine_id) else {
            continue;
        };
        if medicine.stock < line.quantity {
            return Err(ServiceError::conflict(format!(
                "insufficient stock for medicine {}",
                line.medicine_id
            )));
        }
        lines.push(PricedLine {
            medicine_id: medicine.id,
            name: medicine.name.clone(),
            quantity: line.quantity,
            unit_price: medicine.price,
        });
    }

    let total = lines
        .iter()
        .map(PricedLine::line_total)
        .sum::<Decimal>()
        .round_dp(2);

    Ok(PricedOrder { lines, total })
}
