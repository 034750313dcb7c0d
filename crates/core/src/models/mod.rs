//! Domain models shared by checkout, storage, and the HTTP surface.

pub mod cart;
pub mod domain;
pub mod order;

pub use cart::{Cart, CartError, CartItem, Product};
pub use domain::{DnsRecord, Domain, DomainError, DomainName, EmailForwarding};
pub use order::{Order, OrderError, RegistrationRecord, ShippingInfo};
