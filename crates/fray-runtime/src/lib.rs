mod error;
mod global;

pub mod supervise;
pub mod sync;

pub use error::{Error, Result};
pub use global::GlobalConfig;
pub use supervise::{
    CheckOutcome, DaemonLock, Driver, MonitorDecision, MonitorTimings, SessionView, Supervisor,
    SuperviseEvent, check, decide, run,
};
pub use sync::{
    HostedClient, HostedState, cloud_base, pull_streams, push_streams, setup_path_backend,
};
