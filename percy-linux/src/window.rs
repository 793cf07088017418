use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use gtk4::glib;
use libadwaita as adw;
use libadwaita::prelude::*;
use webkit6::prelude::*;

use percy_core::editor_file::EditorFile;
use percy_core::error::Result;
use percy_core::fs_store::FsDocumentStore;
use percy_core::settings::HostSettings;
use percy_editor::assets::{self, AssetServer};
use percy_editor::{outbound, EditorBridge, EditorSession, SessionOptions};

use crate::editor_webview::{self, WebKitChannel};
use crate::theme::AdwThemeSource;

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

pub fn build_window(
    app: &adw::Application,
    file: &Path,
    project_root: &Path,
    settings: &HostSettings,
    assets: &AssetServer,
) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Percy Editor")
        .default_width(1100)
        .default_height(800)
        .build();

    match open_editor(file, project_root, settings, assets) {
        Ok(bridge) => attach_editor(&window, bridge),
        Err(e) => {
            log::error!("Failed to open {}: {}", file.display(), e);
            let status = adw::StatusPage::builder()
                .icon_name("dialog-error-symbolic")
                .title("Editor failed to load")
                .description(e.to_string())
                .build();
            window.set_content(Some(&status));
        }
    }

    window.present();
}

fn open_editor(
    file: &Path,
    project_root: &Path,
    settings: &HostSettings,
    assets: &AssetServer,
) -> Result<EditorBridge<WebKitChannel>> {
    let (tx, rx) = outbound::channel();
    let session = EditorSession::open(
        EditorFile::new(file)?,
        PathBuf::from(project_root),
        Arc::new(FsDocumentStore::new()),
        tx,
        SessionOptions::from(settings),
    )?;
    let url = editor_webview::asset_url(assets, assets::INDEX_FILE);
    EditorBridge::attach(
        session,
        rx,
        WebKitChannel::new(),
        &AdwThemeSource::new(),
        &url,
    )
}

fn attach_editor(window: &adw::ApplicationWindow, bridge: EditorBridge<WebKitChannel>) {
    let bridge = Rc::new(bridge);
    let webview = bridge.channel().webview().clone();
    window.set_title(Some(&format!(
        "{} - Percy Editor",
        bridge.session().file().name()
    )));
    window.set_content(Some(&webview));

    // Scripts evaluated before the page has loaded are lost.
    let loaded = Rc::new(Cell::new(false));
    {
        let loaded = loaded.clone();
        webview.connect_load_changed(move |_, event| {
            if event == webkit6::LoadEvent::Finished {
                loaded.set(true);
            }
        });
    }

    {
        let bridge = bridge.clone();
        let window = window.clone();
        glib::timeout_add_local(PUMP_INTERVAL, move || {
            if bridge.is_disposed() {
                return glib::ControlFlow::Break;
            }
            if loaded.get() {
                bridge.pump();
            }
            if bridge.take_close_request() {
                window.close();
            }
            glib::ControlFlow::Continue
        });
    }

    window.connect_close_request(move |_| {
        if bridge.session().is_modified() {
            log::warn!(
                "Closing {} with unsaved changes",
                bridge.session().file().path().display()
            );
        }
        if let Err(e) = bridge.dispose() {
            log::error!("Failed to release editor: {}", e);
        }
        glib::Propagation::Proceed
    });
}
