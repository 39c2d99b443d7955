//! Error handling foundation for gatehouse.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Domain failures are closed enums defined next to the code that raises
//! them; startup and infrastructure paths wrap those enums in a
//! `rootcause::Report` so context can be layered on as errors propagate.

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
