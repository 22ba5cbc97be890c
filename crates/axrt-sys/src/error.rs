use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{call} failed with status {code:#x}")]
    Status { call: &'static str, code: i32 },

    #[error("driver symbol {0} is not available")]
    MissingSymbol(&'static str),

    #[error("failed to load {library}")]
    LibraryLoad {
        library: String,
        #[source]
        source: libloading::Error,
    },

    #[error("{call} returned invalid data: {reason}")]
    InvalidData { call: &'static str, reason: String },
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Turns a native status code into a result; zero is success.
pub fn check(call: &'static str, code: i32) -> DriverResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(DriverError::Status { call, code })
    }
}
