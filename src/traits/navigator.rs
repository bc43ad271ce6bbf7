//! Navigation trait abstraction.
//!
//! The session manager owns redirect policy but not navigation mechanics;
//! the host wires this trait to whatever routing facility it has.

/// The views the redirect policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// The sign-in view. Never receives a redirect signal, which prevents
    /// redirect loops.
    Entry,
    /// The main diary view. Requires an authenticated session.
    Home,
}

impl View {
    /// Whether an unauthenticated visitor should be redirected away.
    pub fn is_protected(self) -> bool {
        !matches!(self, View::Entry)
    }
}

/// Host-provided navigation facility.
pub trait Navigator: Send + Sync {
    /// The view currently shown.
    fn current(&self) -> View;

    /// Navigate to `view`.
    fn go(&self, view: View);
}
