//! Request handlers.

pub mod health;
pub mod orders;
pub mod payments;

pub use health::*;
pub use orders::*;
pub use payments::*;
