/// Errors raised when building a [`crate::Smoother`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    #[error("wave threshold ({wave_mm}mm) must be below person threshold ({person_mm}mm)")]
    Inverted { wave_mm: u32, person_mm: u32 },
}
