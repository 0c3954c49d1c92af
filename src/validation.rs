//! Pure request validation, run before any I/O.
//!
//! All checks aggregate every violation into one [`ValidationFailures`]
//! rather than failing on the first, so a client can fix a whole form in a
//! single round trip.

use crate::dto::{PaymentItem, PaymentSessionRequest};
use crate::errors::{FieldViolation, ServiceError, ValidationFailures};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use url::Url;

pub const MIN_UNIT_PRICE: Decimal = dec!(0.01);
pub const MAX_UNIT_PRICE: Decimal = dec!(1_000_000);
pub const MIN_QUANTITY: i32 = 1;
pub const MAX_QUANTITY: i32 = 1000;

/// Bounds check on a unit price, reused by item validation.
pub fn validate_amount(amount: Decimal) -> Result<(), FieldViolation> {
    if amount < MIN_UNIT_PRICE || amount > MAX_UNIT_PRICE {
        return Err(FieldViolation::new(
            "price",
            "range",
            format!("price must be between {MIN_UNIT_PRICE} and {MAX_UNIT_PRICE}"),
        ));
    }
    Ok(())
}

/// Validates a list of line items, collecting every violation.
pub fn validate_items(items: &[PaymentItem]) -> Result<(), ServiceError> {
    let mut failures = ValidationFailures::new();
    collect_item_violations(items, &mut failures);
    failures.into_result()
}

fn collect_item_violations(items: &[PaymentItem], failures: &mut ValidationFailures) {
    if items.is_empty() {
        failures.push(FieldViolation::new(
            "items",
            "empty",
            "at least one item is required",
        ));
        return;
    }

    for (index, item) in items.iter().enumerate() {
        let field = |name: &str| format!("items[{index}].{name}");

        if item.id.trim().is_empty() {
            failures.push(FieldViolation::new(
                field("id"),
                "required",
                "item id is required",
            ));
        }
        if item.name.trim().is_empty() {
            failures.push(FieldViolation::new(
                field("name"),
                "required",
                "item name is required",
            ));
        }
        if let Err(violation) = validate_amount(item.price) {
            failures.push(FieldViolation::new(
                field("price"),
                violation.code,
                violation.message,
            ));
        }
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&item.quantity) {
            failures.push(FieldViolation::new(
                field("quantity"),
                "range",
                format!("quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}"),
            ));
        }
    }
}

/// Validates a full payment-session request: items, user identity, and
/// redirect URLs. Same all-errors-at-once contract as [`validate_items`].
pub fn validate_payment_request(request: &PaymentSessionRequest) -> Result<(), ServiceError> {
    let mut failures = ValidationFailures::new();

    collect_item_violations(&request.items, &mut failures);

    if request.user_id.trim().is_empty() {
        failures.push(FieldViolation::new(
            "user_id",
            "required",
            "user id is required",
        ));
    }

    if !validator::validate_email(request.user_email.as_str()) {
        failures.push(FieldViolation::new(
            "user_email",
            "email",
            "user email is not a valid email address",
        ));
    }

    check_absolute_url("success_url", &request.success_url, &mut failures);
    check_absolute_url("cancel_url", &request.cancel_url, &mut failures);

    failures.into_result()
}

fn check_absolute_url(field: &str, raw: &str, failures: &mut ValidationFailures) {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => failures.push(FieldViolation::new(
            field,
            "url",
            format!("{field} must be a well-formed absolute http(s) URL"),
        )),
    }
}
