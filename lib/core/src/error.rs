//! Error handling foundation for expense-desk.
//!
//! Crates define their own error enums and return them wrapped in a
//! rootcause `Report` through this alias. Plain errors convert with `?` or
//! `.into()`.

use rootcause::Report;

/// A `Result` whose error is a `Report` over the context type `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
