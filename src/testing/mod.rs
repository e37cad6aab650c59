//! Test support utilities
//!
//! Mock transport used by unit and integration tests to exercise the
//! connection manager without a broker.

pub mod mocks;

pub use mocks::MockTransport;
