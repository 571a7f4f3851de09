//! Time handling: the cyclic tick clock and the scheduler adapter

mod scheduler;
pub(crate) mod tick;

pub use scheduler::{ManualScheduler, PeriodicCallback, Scheduler, TaskHandle};
