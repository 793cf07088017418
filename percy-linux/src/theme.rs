use libadwaita as adw;
use libadwaita::prelude::*;

use gtk4::glib::thread_guard::ThreadGuard;

use percy_core::subscription::Subscription;
use percy_editor::theme::{ThemeListener, ThemeSource};

/// Follows the libadwaita light/dark preference.
pub struct AdwThemeSource {
    style_manager: adw::StyleManager,
}

impl AdwThemeSource {
    pub fn new() -> Self {
        Self {
            style_manager: adw::StyleManager::default(),
        }
    }
}

impl ThemeSource for AdwThemeSource {
    fn is_dark(&self) -> bool {
        self.style_manager.is_dark()
    }

    fn on_theme_change(&self, listener: ThemeListener) -> Subscription {
        let id = self
            .style_manager
            .connect_dark_notify(move |sm| listener(sm.is_dark()));
        // Signal handlers belong to the main thread; the guard keeps the
        // release there.
        let guard = ThreadGuard::new((self.style_manager.clone(), id));
        Subscription::new("theme", move || {
            let (style_manager, id) = guard.into_inner();
            style_manager.disconnect(id);
            Ok(())
        })
    }
}
