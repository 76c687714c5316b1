//! Post-mutation notification hook.

use std::sync::Arc;

/// Called after every successful change to add-on or revision state, for
/// example to regenerate the public XML feeds.
///
/// Fire-and-forget: implementations must not block for long and have no way
/// to report failure back to the mutation that triggered them.
pub trait Notifier: Send + Sync {
    fn notify(&self);
}

impl<F> Notifier for F
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) {
        self()
    }
}

pub type NotifierHandle = Arc<dyn Notifier>;

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_notifier() {
        let count = Arc::new(AtomicUsize::new(0));
        let notifier: NotifierHandle = {
            let count = Arc::clone(&count);
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        notifier.notify();
        notifier.notify();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
