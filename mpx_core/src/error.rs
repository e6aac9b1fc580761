pub mod error {
    use thiserror::Error;

    pub type KernelResult<T> = Result<T, KernelError>;

    /// Input rejected before any kernel state was touched.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
    pub enum ValidationError {
        #[error("invalid process name")]
        InvalidName,
        #[error("invalid process class")]
        InvalidClass,
        #[error("priority must be between 0 and 9")]
        InvalidPriority,
        #[error("invalid device")]
        InvalidDevice,
        #[error("invalid buffer")]
        InvalidBuffer,
        #[error("invalid length")]
        InvalidLength,
        #[error("baud rate must evenly divide 115200")]
        InvalidBaudRate,
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
    pub enum KernelError {
        #[error(transparent)]
        Validation(#[from] ValidationError),
        #[error("out of memory")]
        ResourceExhausted,
        #[error("not found")]
        NotFound,
        #[error("resource busy")]
        Busy,
        #[error("operation not permitted")]
        Unauthorized,
    }
}
