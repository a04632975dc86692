use anyhow::{Context, Result};
use tracing::info;
use url::Url;

/// Performs the actual page navigation for a resolved entry URL.
pub trait Navigator {
    fn open_url(&self, url: &Url) -> Result<()>;
}

/// Navigates by opening the URL in the user's default browser.
pub struct SystemBrowser;

impl Navigator for SystemBrowser {
    fn open_url(&self, url: &Url) -> Result<()> {
        info!("opening {url}");
        open::that(url.as_str()).with_context(|| format!("open {url} in the browser"))
    }
}

pub fn system() -> Box<dyn Navigator> {
    Box::new(SystemBrowser)
}
