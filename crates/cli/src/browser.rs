use adsight_connect::{Browser, PopupHandle, PopupRefusal};
use colored::Colorize;
use tracing::{debug, warn};

/// Opens authorization pages in the user's default browser. Window
/// features have no meaning here, so every attempt is the same launch and
/// hands back the same window reference.
#[derive(Debug, Clone)]
pub struct SystemBrowser {
    window: PopupHandle,
}

impl SystemBrowser {
    pub fn new(window: PopupHandle) -> Self {
        Self { window }
    }
}

impl Browser for SystemBrowser {
    fn open_popup(&mut self, url: &str, name: &str, features: &str) -> Result<PopupHandle, PopupRefusal> {
        debug!(name, features, "Launching system browser");
        match open::that(url) {
            Ok(()) => Ok(self.window.clone()),
            Err(e) => {
                warn!("Failed to open browser: {e}");
                Err(PopupRefusal::Inaccessible(e.to_string()))
            }
        }
    }

    fn navigate(&mut self, url: &str) -> bool {
        println!();
        println!("{}", "Could not open a browser window. Open this URL to continue:".yellow());
        println!("  {url}");
        true
    }
}
