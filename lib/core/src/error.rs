//! Error handling foundation for collectdesk.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain error types in its own error module.
//! Storage and transport layers return `Report<C>` so context can be layered
//! on as errors propagate.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }
}
