mod agent_ref;
mod machine;
mod project;

pub use agent_ref::{AgentRef, base_of};
pub use machine::{MachineIdentity, device_fingerprint};
pub use project::{
    Error, FRAY_DIR, Result, discover_project, fray_dir, global_config_dir, local_dir, shared_dir,
};
