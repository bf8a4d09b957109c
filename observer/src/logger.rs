/// Lifecycle events the observer reports to its host application.
pub trait Logger: Send + Sync {
    fn log_register(&self, name: &str);

    fn log_observer_start(&self);

    fn log_observer_stop(&self);
}

pub struct NopLogger;

impl Logger for NopLogger {
    fn log_register(&self, _name: &str) {}

    fn log_observer_start(&self) {}

    fn log_observer_stop(&self) {}
}
