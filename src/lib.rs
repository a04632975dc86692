//! Quick-access navigation for the Budget Manager web app: the
//! "Data Administration" menu, rendered as a native tray/menu bar popup
//! and as a CLI, with every entry opening its page in the browser.

pub mod config;
pub mod menubar;
pub mod nav;
pub mod navigate;
