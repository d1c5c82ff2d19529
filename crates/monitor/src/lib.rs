pub mod check;
pub mod notify;
pub mod scheduler;

#[cfg(test)]
mod fixtures;

pub use check::{CheckOrchestrator, CheckReport};
pub use notify::{
    compose, ConsoleNotifier, Dispatcher, Notification, Notifier, NotifyOutcome, NotifySettings, WebhookNotifier,
};
pub use scheduler::{Engine, PollScheduler, ScheduleError, SchedulerState};
