use crate::error::Result;

type Release = Box<dyn FnOnce() -> Result<()> + Send>;

/// Handle returned by every listener registration (`on_change`,
/// `on_theme_change`).
///
/// The listener stays registered until [`Subscription::unsubscribe`] is called
/// or the handle is dropped, whichever comes first. The release closure runs
/// exactly once.
pub struct Subscription {
    label: &'static str,
    release: Option<Release>,
}

impl Subscription {
    pub fn new(label: &'static str, release: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            label,
            release: Some(Box::new(release)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Release the listener now and report whether the release succeeded.
    pub fn unsubscribe(mut self) -> Result<()> {
        self.release_now()
    }

    fn release_now(&mut self) -> Result<()> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Err(e) = self.release_now() {
            log::warn!("Failed to release {} subscription: {}", self.label, e);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}
