use crate::error::ObserverError;
use crate::frame::Frame;
use crate::instruction::{CallSite, FieldRef, Offset};
use crate::taint::Taint;
use log::error;
use std::panic::{self, AssertUnwindSafe};

/// Auxiliary per-instruction callbacks run alongside the transfer functions.
///
/// Observers only ever see frames by shared reference, and a failing (or
/// panicking) observer is logged and skipped; it can't affect the analysis.
/// Every callback defaults to doing nothing.
pub trait FrameObserver: Send + Sync {
    /// Human-readable name used when logging failures
    fn name(&self) -> &str;

    /// After a field read or write. `taint` is the value read or written.
    fn visit_field(
        &self,
        _method: &str,
        _offset: Offset,
        _field: &FieldRef,
        _frame: &Frame,
        _taint: &Taint,
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// After a local load; the loaded words are on top of `frame`'s stack
    fn visit_load(&self, _method: &str, _offset: Offset, _frame: &Frame, _words: usize) -> Result<(), ObserverError> {
        Ok(())
    }

    /// After a call. `parameters` are copies of the consumed stack words, top
    /// of the stack first.
    fn visit_invoke(
        &self,
        _method: &str,
        _offset: Offset,
        _call: &CallSite,
        _frame: &Frame,
        _parameters: &[Taint],
    ) -> Result<(), ObserverError> {
        Ok(())
    }

    /// At each return of a value
    fn visit_return(&self, _method: &str, _offset: Offset, _taint: &Taint) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Once per method, with the merged taint of everything it returns
    /// (`None` for void methods or methods that never return)
    fn visit_method_complete(&self, _method: &str, _output: Option<&Taint>) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Run `callback` on every observer, logging failures
pub(crate) fn notify_all<F>(observers: &[Box<dyn FrameObserver>], callback: F)
where
    F: Fn(&dyn FrameObserver) -> Result<(), ObserverError>,
{
    for observer in observers {
        let observer: &dyn FrameObserver = observer.as_ref();
        match panic::catch_unwind(AssertUnwindSafe(|| callback(observer))) {
            Ok(Ok(())) => {},
            Ok(Err(e)) => error!("Error while executing observer {}: {}", observer.name(), e),
            Err(_) => error!("Observer {} panicked", observer.name()),
        }
    }
}
