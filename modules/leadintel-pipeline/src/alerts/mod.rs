pub mod detect;
pub mod dispatcher;
pub mod monitor;
pub mod simulated;

pub use detect::{CompetitorSnapshot, SnapshotChangeSource};
pub use dispatcher::AlertDispatcher;
pub use monitor::{MonitorHandle, TickStats};
pub use simulated::SimulatedChangeSource;
