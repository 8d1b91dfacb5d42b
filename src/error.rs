use thiserror::Error;

/// Errors surfaced by the configuration store, the message engine and the
/// connector layer. The step loop itself never fails its caller for a
/// transient transport problem; those arrive through the event callback.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("unknown configuration key")]
    UnknownKey,
    #[error("value does not fit the declared capacity")]
    BadSize,
    #[error("configuration key is not writable")]
    NotWritable,
    #[error("required field missing or malformed")]
    InvalidArgument,
    #[error("message pool exhausted")]
    NoMemory,
    #[error("a call is already awaiting its response")]
    Busy,
    #[error("no frame pending")]
    NoMessage,
    #[error("response does not match any outstanding call")]
    NoLink,
    #[error("the engine sends this message on its own")]
    AlreadyHandled,
    #[error("transport send/receive failed")]
    Transport,
    #[error("snapshot header or size mismatch")]
    BadSnapshot,
}
