pub mod error_stream;
pub mod gate;

pub use error_stream::{DEFAULT_ERROR_BUFFER, ErrorStream, MAX_ERROR_BUFFER};
pub use gate::{Gate, GateError, GateResult};
