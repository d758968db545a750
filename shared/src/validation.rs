//! Validation utilities for inventory input
//!
//! Checks run at the system boundary, before values reach ledger or takeoff math.

use std::str::FromStr;

use rust_decimal::Decimal;

// ============================================================================
// Identifiers
// ============================================================================

/// Validate a material identifier (SKU or catalog id)
pub fn validate_material_id(material_id: &str) -> Result<(), &'static str> {
    let trimmed = material_id.trim();
    if trimmed.is_empty() {
        return Err("Material ID is required");
    }
    if trimmed.len() > 128 {
        return Err("Material ID must be at most 128 characters");
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err("Material ID cannot contain control characters");
    }
    Ok(())
}

// ============================================================================
// Quantities
// ============================================================================

/// Decimal places a stored quantity may carry
pub const QUANTITY_SCALE: u32 = 4;

/// Integer digits a stored quantity may carry
pub const QUANTITY_INTEGER_DIGITS: u32 = 14;

/// Stored quantities are `NUMERIC(18,4)`; anything finer or larger would be
/// rounded or refused by the database.
pub fn validate_quantity_range(quantity: Decimal) -> Result<(), &'static str> {
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity cannot have more than 4 decimal places");
    }
    if quantity.abs() >= Decimal::from(10i64.pow(QUANTITY_INTEGER_DIGITS)) {
        return Err("Quantity cannot exceed 14 integer digits");
    }
    Ok(())
}

/// Quantity moved by a purchase, allocation, return or transfer
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    validate_quantity_range(quantity)
}

/// Quantity held in a level snapshot
pub fn validate_non_negative_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Quantity cannot be negative");
    }
    validate_quantity_range(quantity)
}

/// Waste multipliers below 1 would shrink a requirement
pub fn validate_waste_factor(factor: Decimal) -> Result<(), &'static str> {
    if factor < Decimal::ONE {
        return Err("Waste factor must be at least 1");
    }
    if factor > Decimal::from(10) {
        return Err("Waste factor must be at most 10");
    }
    Ok(())
}

/// Parse a user-supplied number; accepts plain and scientific notation
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Parse a quantity cell from an import file
pub fn parse_quantity(raw: &str) -> Result<Decimal, &'static str> {
    if raw.trim().is_empty() {
        return Err("Quantity is required");
    }
    let quantity = parse_decimal(raw).ok_or("Quantity must be a number")?;
    validate_non_negative_quantity(quantity)?;
    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_id_rules() {
        assert!(validate_material_id("WIRE-12-THHN").is_ok());
        assert_eq!(validate_material_id("   "), Err("Material ID is required"));
        assert!(validate_material_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(parse_quantity("12.5"), Ok(Decimal::new(125, 1)));
        assert_eq!(parse_quantity(" 3 "), Ok(Decimal::from(3)));
        assert_eq!(parse_quantity("1e2"), Ok(Decimal::from(100)));
        assert_eq!(parse_quantity("abc"), Err("Quantity must be a number"));
        assert_eq!(parse_quantity(""), Err("Quantity is required"));
        assert_eq!(parse_quantity("-1"), Err("Quantity cannot be negative"));
    }

    #[test]
    fn quantity_precision_limits() {
        assert!(validate_positive_quantity(Decimal::new(1, 4)).is_ok());
        assert!(validate_positive_quantity(Decimal::new(150000, 5)).is_ok());
        assert_eq!(
            validate_positive_quantity(Decimal::new(1, 5)),
            Err("Quantity cannot have more than 4 decimal places")
        );
        assert_eq!(
            parse_quantity("0.00004"),
            Err("Quantity cannot have more than 4 decimal places")
        );

        assert!(validate_non_negative_quantity(Decimal::new(999_999_999_999_999_999, 4)).is_ok());
        assert_eq!(
            validate_positive_quantity(Decimal::from(100_000_000_000_000i64)),
            Err("Quantity cannot exceed 14 integer digits")
        );
        assert!(parse_quantity("5e28").is_err());
        assert!(validate_quantity_range(Decimal::from(-100_000_000_000_000i64)).is_err());
    }

    #[test]
    fn waste_factor_bounds() {
        assert!(validate_waste_factor(Decimal::ONE).is_ok());
        assert!(validate_waste_factor(Decimal::new(11, 1)).is_ok());
        assert!(validate_waste_factor(Decimal::new(9, 1)).is_err());
    }
}
