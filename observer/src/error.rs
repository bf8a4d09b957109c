use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("nothing to observe, enable at least one reading")]
    NothingToObserve,
    #[error("{0} interval must be greater than zero")]
    InvalidInterval(&'static str),
    #[error("observer already started")]
    AlreadyStarted,
    #[error("observer must be started from within a tokio runtime")]
    NoRuntime,
    #[error("observer state lock poisoned")]
    Poisoned,
    #[error("observer task failed")]
    Task(#[from] tokio::task::JoinError),
}
