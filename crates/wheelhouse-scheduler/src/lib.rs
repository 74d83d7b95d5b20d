//! Build-test matrix execution for wheelhouse.
//!
//! Runs the eligible cells of one platform's matrix strictly in sequence:
//! build, locate the artifact, install it, run the test suite.

pub mod cell;
pub mod events;
pub mod orchestrator;
pub mod summary;

pub use cell::CellRunner;
pub use events::{EventSink, MatrixEvent, TracingSink};
pub use orchestrator::MatrixOrchestrator;
pub use summary::TestSummary;
