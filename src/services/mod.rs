pub mod poller;
pub mod supervisor;

pub use poller::{PollSettings, Poller};
pub use supervisor::{Supervisor, SupervisorError, SupervisorHandle, shutdown_process};
