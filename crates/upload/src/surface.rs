//! Progress presentation.

use crate::progress::ProgressSnapshot;

/// Where session progress is shown: an overlay, a terminal bar, a log.
///
/// Called only from the session driver, in order: `begin`, any number of
/// `update`s, then `end` or `fail`.
pub trait ProgressSurface: Send {
    fn begin(&mut self, title: &str);
    fn update(&mut self, snapshot: &ProgressSnapshot);
    fn end(&mut self);
    fn fail(&mut self, message: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl ProgressSurface for NullSurface {
    fn begin(&mut self, _title: &str) {}
    fn update(&mut self, _snapshot: &ProgressSnapshot) {}
    fn end(&mut self) {}
    fn fail(&mut self, _message: &str) {}
}
