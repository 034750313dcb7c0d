//! Shopping cart.
//!
//! The cart total is never stored: [`Cart::total`] recomputes it from the
//! items on every call, so it cannot drift from the line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Currency, ProductId};

/// Errors raised by cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// A quantity of zero was supplied where at least one is required.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
}

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Unit price in human units.
    pub price: Decimal,
    pub currency: Currency,
    pub image_url: Option<String>,
    /// Print-on-demand variant id; products without one are not sent to
    /// fulfillment.
    pub fulfillment_variant_id: Option<i64>,
}

impl Product {
    /// Whether the fulfillment service can produce this product.
    #[must_use]
    pub const fn is_fulfillment_eligible(&self) -> bool {
        self.fulfillment_variant_id.is_some()
    }
}

/// A product and how many of it are in the cart. Quantity is always ≥ 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    /// `price * quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// The shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Sum of `price * quantity` over all items.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total number of units across all lines (for the cart badge).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |count, item| count.saturating_add(item.quantity))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product.id == id)
    }

    /// Add `quantity` units of `product`, creating the line if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ZeroQuantity`] if `quantity` is zero.
    pub fn add(&mut self, product: Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product.id == product.id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
        } else {
            self.items.push(CartItem { product, quantity });
        }
        Ok(())
    }

    /// Remove `quantity` units of a product. A line that drops below one
    /// unit is removed entirely. Returns whether the cart changed.
    pub fn remove_quantity(&mut self, id: &ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        let Some(position) = self.items.iter().position(|item| &item.product.id == id) else {
            return false;
        };

        let remaining = self
            .items
            .get(position)
            .map_or(0, |item| item.quantity.saturating_sub(quantity));
        if remaining == 0 {
            self.items.remove(position);
        } else if let Some(item) = self.items.get_mut(position) {
            item.quantity = remaining;
        }
        true
    }

    /// Set a line's quantity. Zero removes the line. Returns whether the cart
    /// changed.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(id);
        }
        match self.items.iter_mut().find(|item| &item.product.id == id) {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Remove a product's line. Returns whether a line was removed.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.product.id != id);
        self.items.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: id.to_owned(),
            price: Decimal::new(cents, 2),
            currency: Currency::Usdt,
            image_url: None,
            fulfillment_variant_id: None,
        }
    }

    fn expected_total(cart: &Cart) -> Decimal {
        cart.items()
            .iter()
            .map(|item| item.product.price * Decimal::from(item.quantity))
            .sum()
    }

    #[test]
    fn test_add_creates_line() {
        let mut cart = Cart::new();
        cart.add(product("tee", 2500), 2).unwrap();
        assert_eq!(cart.get(&ProductId::new("tee")).unwrap().quantity, 2);
        assert_eq!(cart.total(), Decimal::new(5000, 2));
    }

    #[test]
    fn test_add_existing_increments() {
        let mut cart = Cart::new();
        cart.add(product("tee", 2500), 1).unwrap();
        cart.add(product("tee", 2500), 3).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn test_add_zero_is_rejected() {
        let mut cart = Cart::new();
        assert_eq!(cart.add(product("tee", 2500), 0), Err(CartError::ZeroQuantity));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_quantity_below_one_removes_line() {
        let mut cart = Cart::new();
        cart.add(product("mug", 1299), 2).unwrap();

        assert!(cart.remove_quantity(&ProductId::new("mug"), 1));
        assert_eq!(cart.get(&ProductId::new("mug")).unwrap().quantity, 1);

        assert!(cart.remove_quantity(&ProductId::new("mug"), 5));
        assert!(cart.get(&ProductId::new("mug")).is_none());
        assert!(!cart.remove_quantity(&ProductId::new("mug"), 1));
    }

    #[test]
    fn test_remove_zero_quantity_is_no_op() {
        let mut cart = Cart::new();
        cart.add(product("mug", 1299), 2).unwrap();
        let before = cart.clone();

        assert!(!cart.remove_quantity(&ProductId::new("mug"), 0));
        assert_eq!(cart, before);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = Cart::new();
        cart.add(product("mug", 1299), 2).unwrap();
        assert!(cart.set_quantity(&ProductId::new("mug"), 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_total_tracks_every_mutation() {
        let mut cart = Cart::new();
        let steps: Vec<Box<dyn Fn(&mut Cart)>> = vec![
            Box::new(|c| c.add(product("tee", 2500), 2).unwrap()),
            Box::new(|c| c.add(product("mug", 1299), 1).unwrap()),
            Box::new(|c| {
                c.remove_quantity(&ProductId::new("tee"), 1);
            }),
            Box::new(|c| c.add(product("cap", 1950), 3).unwrap()),
            Box::new(|c| {
                c.set_quantity(&ProductId::new("mug"), 4);
            }),
            Box::new(|c| {
                c.remove(&ProductId::new("cap"));
            }),
            Box::new(Cart::clear),
        ];

        for step in steps {
            step(&mut cart);
            assert_eq!(cart.total(), expected_total(&cart));
        }
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn test_fulfillment_eligibility() {
        let mut printable = product("poster", 1500);
        assert!(!printable.is_fulfillment_eligible());
        printable.fulfillment_variant_id = Some(4011);
        assert!(printable.is_fulfillment_eligible());
    }
}
