pub mod poller;

pub use poller::{JobPoller, PollObserver, POLL_INTERVAL};
