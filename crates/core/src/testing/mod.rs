//! Mock implementations for testing.
//!
//! These mocks implement the backend traits with controllable behavior
//! so engine and pipeline tests never shell out to real binaries. They
//! create real files on disk where the pipeline expects them, so
//! filesystem handling is exercised too.

mod mock_converter;
mod mock_fetcher;

pub use mock_converter::MockConverter;
pub use mock_fetcher::MockFetcher;
