//! Foreground/background signal for the browser runtime.

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub type VisibilityListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Whether the tab is currently visible, with change notifications.
pub trait VisibilitySource: Send + Sync {
    fn is_foreground_active(&self) -> bool;

    /// `listener` receives the new foreground flag on every transition.
    fn on_visibility_change(&self, listener: VisibilityListener);
}

/// Visibility driven by the runtime glue via `set_foreground`.
pub struct VisibilityChannel {
    foreground: AtomicBool,
    listeners: Mutex<Vec<VisibilityListener>>,
}

impl VisibilityChannel {
    #[must_use]
    pub fn new(foreground: bool) -> Self {
        Self {
            foreground: AtomicBool::new(foreground),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Records a visibility change. Repeating the current value notifies nobody.
    pub fn set_foreground(&self, foreground: bool) {
        let previous = self.foreground.swap(foreground, Ordering::AcqRel);
        if previous == foreground {
            return;
        }
        let listeners: Vec<VisibilityListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(foreground);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for VisibilityChannel {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilitySource for VisibilityChannel {
    fn is_foreground_active(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    fn on_visibility_change(&self, listener: VisibilityListener) {
        self.listeners.lock().push(listener);
    }
}

impl std::fmt::Debug for VisibilityChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityChannel")
            .field("foreground", &self.is_foreground_active())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
