use thiserror::Error;

/// Invalid input to the derived-field computations in [`crate::command`].
///
/// These are caller precondition violations: the encoder refuses to produce a
/// command rather than transmit a division or overflow artifact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("calibration reference must be finite and greater than zero, got {reference}")]
    InvalidReference { reference: f64 },
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} does not fit the device's integer range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

impl EncodeError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidReference { .. } => "reference",
            Self::NonFinite { field, .. } | Self::OutOfRange { field, .. } => field,
        }
    }
}
