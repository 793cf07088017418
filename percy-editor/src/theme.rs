//! Host theme source.
//!
//! The toolkit adapters wrap their own light/dark notification in
//! [`ThemeSource`]. [`ThemeState`] is the plain implementation used by the
//! C ABI, where the host pushes theme changes in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use percy_core::subscription::Subscription;

pub type ThemeListener = Box<dyn Fn(bool) + Send + Sync>;

pub trait ThemeSource {
    fn is_dark(&self) -> bool;

    /// Call `listener` with the new value whenever the theme flips.
    fn on_theme_change(&self, listener: ThemeListener) -> Subscription;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_id: HashMap<u64, Arc<dyn Fn(bool) + Send + Sync>>,
}

#[derive(Clone, Default)]
pub struct ThemeState {
    dark: Arc<AtomicBool>,
    listeners: Arc<Mutex<Listeners>>,
}

impl ThemeState {
    pub fn new(dark: bool) -> Self {
        Self {
            dark: Arc::new(AtomicBool::new(dark)),
            listeners: Arc::default(),
        }
    }

    /// Update the theme, notifying listeners only when it actually changes.
    pub fn set_dark(&self, dark: bool) {
        if self.dark.swap(dark, Ordering::SeqCst) == dark {
            return;
        }
        log::info!("Theme changed: dark={}", dark);
        let listeners: Vec<_> = self.listeners.lock().by_id.values().cloned().collect();
        for listener in listeners {
            listener(dark);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().by_id.len()
    }
}

impl ThemeSource for ThemeState {
    fn is_dark(&self) -> bool {
        self.dark.load(Ordering::SeqCst)
    }

    fn on_theme_change(&self, listener: ThemeListener) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.by_id.insert(id, Arc::from(listener));
            id
        };
        let listeners = Arc::clone(&self.listeners);
        Subscription::new("theme", move || {
            listeners.lock().by_id.remove(&id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_on_change_only() {
        let theme = ThemeState::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = theme.on_theme_change(Box::new(move |dark| s.lock().push(dark)));

        theme.set_dark(true);
        theme.set_dark(true);
        theme.set_dark(false);

        assert_eq!(*seen.lock(), vec![true, false]);
        assert!(!theme.is_dark());
    }

    #[test]
    fn dropping_subscription_removes_listener() {
        let theme = ThemeState::new(true);
        let sub = theme.on_theme_change(Box::new(|_| {}));
        assert_eq!(theme.listener_count(), 1);
        drop(sub);
        assert_eq!(theme.listener_count(), 0);
    }
}
