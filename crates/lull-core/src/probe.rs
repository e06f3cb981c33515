use anyhow::Result;

/// Foreground-window probe for immersive detection
///
/// Platform backends live outside the engine; the classifier only needs
/// these two questions answered and degrades both to their least-surprising
/// default when a probe fails.
pub trait ForegroundProbe: Send {
    /// Name of the currently focused process, lowercased conventions apply
    /// on the caller side.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform query fails; callers treat that as
    /// an empty name.
    fn active_process_name(&self) -> Result<String>;

    /// Whether the foreground window covers the screen.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform query fails; callers treat that as
    /// not fullscreen.
    fn is_fullscreen(&self) -> Result<bool>;
}

/// Probe that reports nothing, for platforms without a backend and for tests
pub struct NullProbe;

impl ForegroundProbe for NullProbe {
    fn active_process_name(&self) -> Result<String> {
        Ok(String::new())
    }

    fn is_fullscreen(&self) -> Result<bool> {
        Ok(false)
    }
}
