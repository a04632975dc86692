use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use crate::config;
use crate::menubar::commands::{
    Command, EntriesMap, CMD_BASE_ENTRY, CMD_EDIT_CONFIG, CMD_OPEN_CONFIG_FOLDER, CMD_QUIT,
    CMD_RELOAD, CMD_TOGGLE_STARTUP,
};
use crate::menubar::common;
use crate::menubar::menu::{MenuItem, MenuSpec};
use crate::menubar::startup::StartupManager;
use crate::nav;
use crate::navigate::Navigator;

/// Platform-independent state behind the tray menu: the navigation entries,
/// the resolved base URL, and the way clicks turn into page navigation.
pub struct NavModel {
    entries: EntriesMap,
    base_url: Url,
    navigator: Box<dyn Navigator>,
    last_error: Option<String>,
    start_enabled: bool,
    start_pref: Option<bool>,
}

#[derive(Debug, Default, Clone)]
pub struct ModelUpdate {
    pub refresh_menu: bool,
    pub refresh_tooltip: bool,
    pub quit: bool,
    pub open_path: Option<PathBuf>,
}

impl NavModel {
    pub fn new(navigator: Box<dyn Navigator>) -> Self {
        let (base_url, start_pref, load_error) = load_nav_state();

        Self {
            entries: common::build_entries(CMD_BASE_ENTRY),
            base_url,
            navigator,
            last_error: load_error,
            start_enabled: start_pref.unwrap_or(false),
            start_pref,
        }
    }

    pub fn entries(&self) -> &EntriesMap {
        &self.entries
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    /// Syncs the start-at-login preference with the OS, keeping the first
    /// error for the tooltip. Called by renderers at startup and on reload.
    pub fn apply_startup(&mut self, startup: &dyn StartupManager) {
        let (start_enabled, startup_error) = common::apply_startup_pref(
            self.start_pref,
            |enabled| {
                startup
                    .set_enabled(enabled)
                    .context("update startup setting")
            },
            || startup.is_enabled().context("read startup setting"),
        );
        self.start_enabled = start_enabled;
        if self.last_error.is_none() {
            self.last_error = startup_error;
        }
    }

    /// Records a renderer-side failure for the tooltip.
    pub fn record_error(&mut self, msg: String) {
        self.last_error = Some(msg);
    }

    /// Builds the menu from scratch: one "Data Administration" popup holding
    /// the navigation entries in table order, then the app controls.
    /// A fresh value every call, so rebuilding can never duplicate entries.
    pub fn menu_spec(&self) -> MenuSpec {
        let dropdown = self
            .entries
            .iter()
            .map(|(cmd, entry)| MenuItem::Action {
                id: *cmd,
                title: entry.label.to_string(),
                checked: false,
                enabled: true,
            })
            .collect();

        let mut items = Vec::new();
        items.push(MenuItem::Submenu {
            title: nav::MENU_TITLE.to_string(),
            items: dropdown,
        });

        items.push(MenuItem::Separator);
        items.push(MenuItem::Action {
            id: CMD_TOGGLE_STARTUP,
            title: "Start at login".to_string(),
            checked: self.start_enabled,
            enabled: true,
        });
        items.push(MenuItem::Action {
            id: CMD_EDIT_CONFIG,
            title: "Edit config".to_string(),
            checked: false,
            enabled: true,
        });
        items.push(MenuItem::Action {
            id: CMD_OPEN_CONFIG_FOLDER,
            title: "Open config folder".to_string(),
            checked: false,
            enabled: true,
        });
        items.push(MenuItem::Action {
            id: CMD_RELOAD,
            title: "Reload config".to_string(),
            checked: false,
            enabled: true,
        });
        items.push(MenuItem::Action {
            id: CMD_QUIT,
            title: "Quit".to_string(),
            checked: false,
            enabled: true,
        });

        MenuSpec::new(items)
    }

    pub fn handle(&mut self, cmd: Command, startup: &dyn StartupManager) -> Result<ModelUpdate> {
        let update = match cmd {
            Command::Navigate(entry) => self
                .open_entry(&entry)
                .map(|_| ModelUpdate {
                    refresh_tooltip: true,
                    ..Default::default()
                })
                .unwrap_or_else(|err| self.note_error(err)),
            Command::Reload => self
                .reload_config(startup)
                .unwrap_or_else(|err| self.note_error(err)),
            Command::ToggleStartup => self
                .toggle_startup(startup)
                .unwrap_or_else(|err| self.note_error(err)),
            Command::EditConfig => self
                .edit_config()
                .map(|path| ModelUpdate {
                    open_path: Some(path),
                    ..Default::default()
                })
                .unwrap_or_else(|err| self.note_error(err)),
            Command::OpenConfigFolder => self
                .open_config_folder()
                .map(|path| ModelUpdate {
                    open_path: Some(path),
                    ..Default::default()
                })
                .unwrap_or_else(|err| self.note_error(err)),
            Command::Quit => ModelUpdate {
                quit: true,
                ..Default::default()
            },
        };

        Ok(update)
    }

    fn note_error(&mut self, err: anyhow::Error) -> ModelUpdate {
        self.last_error = Some(err.to_string());
        ModelUpdate {
            refresh_tooltip: true,
            ..Default::default()
        }
    }

    fn open_entry(&mut self, entry: &nav::NavEntry) -> Result<()> {
        let url = nav::resolve_url(&self.base_url, entry)?;
        info!(entry = entry.id, %url, "navigating");
        self.navigator
            .open_url(&url)
            .with_context(|| format!("navigate to '{}'", entry.label))?;
        self.last_error = None;
        Ok(())
    }

    fn reload_config(&mut self, startup: &dyn StartupManager) -> Result<ModelUpdate> {
        let (base_url, start_pref, load_error) = load_nav_state();
        self.base_url = base_url;
        self.start_pref = start_pref;
        self.last_error = load_error;
        self.apply_startup(startup);

        Ok(ModelUpdate {
            refresh_menu: true,
            refresh_tooltip: true,
            ..Default::default()
        })
    }

    fn toggle_startup(&mut self, startup: &dyn StartupManager) -> Result<ModelUpdate> {
        let next = !self.start_enabled;
        startup
            .set_enabled(next)
            .context("update startup setting")?;
        let _path = config::patch_start_at_login(next).context("update config")?;
        self.start_enabled = next;
        self.last_error = None;
        Ok(ModelUpdate {
            refresh_menu: true,
            refresh_tooltip: true,
            ..Default::default()
        })
    }

    fn edit_config(&mut self) -> Result<PathBuf> {
        let path = config::ensure_config_file_exists().context("ensure config exists")?;
        Ok(path)
    }

    fn open_config_folder(&mut self) -> Result<PathBuf> {
        let Some(path) = config::resolve_config_path() else {
            return Err(anyhow::anyhow!("No config path available"));
        };
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("No parent directory for config path"))?;
        Ok(parent.to_path_buf())
    }
}

fn load_nav_state() -> (Url, Option<bool>, Option<String>) {
    let cfg = match config::load_optional() {
        Ok(v) => v,
        Err(e) => return (default_base(), None, Some(e.to_string())),
    };
    let start_pref = cfg.as_ref().and_then(|c| c.start_at_login);

    match config::resolve(cfg.as_ref(), None) {
        Ok(resolved) => (resolved.base_url, start_pref, None),
        Err(e) => (default_base(), start_pref, Some(e.to_string())),
    }
}

fn default_base() -> Url {
    Url::parse(config::DEFAULT_BASE_URL).expect("default base URL is valid")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::menubar::commands::decode;
    use crate::navigate::Navigator;

    #[derive(Clone, Default)]
    struct RecordingNavigator {
        opened: Arc<Mutex<Vec<Url>>>,
    }

    impl Navigator for RecordingNavigator {
        fn open_url(&self, url: &Url) -> Result<()> {
            self.opened.lock().unwrap().push(url.clone());
            Ok(())
        }
    }

    struct FailingNavigator;

    impl Navigator for FailingNavigator {
        fn open_url(&self, _url: &Url) -> Result<()> {
            Err(anyhow::anyhow!("no browser available"))
        }
    }

    struct FakeStartup;

    impl StartupManager for FakeStartup {
        fn is_enabled(&self) -> Result<bool> {
            Ok(false)
        }
        fn set_enabled(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }
    }

    fn model_with(navigator: Box<dyn Navigator>) -> NavModel {
        NavModel {
            entries: common::build_entries(CMD_BASE_ENTRY),
            base_url: Url::parse("http://localhost:8080/").unwrap(),
            navigator,
            last_error: None,
            start_enabled: false,
            start_pref: None,
        }
    }

    #[test]
    fn menu_has_exactly_one_popup_with_entries_in_order() {
        let model = model_with(Box::new(RecordingNavigator::default()));
        let spec = model.menu_spec();

        let submenus = spec.submenus().collect::<Vec<_>>();
        assert_eq!(submenus.len(), 1);
        let (title, items) = submenus[0];
        assert_eq!(title, "Data Administration");

        let labels = items
            .iter()
            .map(|item| match item {
                MenuItem::Action { title, .. } => title.as_str(),
                other => panic!("unexpected dropdown item {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            ["Manage Savings Goals", "Manage Deposits", "Manage Transaction"]
        );
    }

    #[test]
    fn rebuilding_the_menu_is_idempotent() {
        let model = model_with(Box::new(RecordingNavigator::default()));
        let first = model.menu_spec();
        let second = model.menu_spec();
        assert_eq!(first, second);
        // In particular the dropdown does not grow.
        assert_eq!(first.submenus().next().unwrap().1.len(), 3);
    }

    #[test]
    fn each_entry_navigates_to_exactly_its_target() {
        let navigator = RecordingNavigator::default();
        let opened = navigator.opened.clone();
        let mut model = model_with(Box::new(navigator));

        for (cmd, entry) in model.entries.clone() {
            let command = decode(cmd, model.entries()).unwrap();
            let update = model.handle(command, &FakeStartup).unwrap();
            assert!(update.refresh_tooltip);
            assert!(!update.quit);
            let last = opened.lock().unwrap().last().cloned().unwrap();
            assert_eq!(
                last.as_str(),
                format!("http://localhost:8080/{}", entry.target)
            );
        }

        assert_eq!(opened.lock().unwrap().len(), 3);
    }

    #[test]
    fn navigation_failure_degrades_to_last_error() {
        let mut model = model_with(Box::new(FailingNavigator));
        let entry = *model.entries.values().next().unwrap();
        let update = model.handle(Command::Navigate(entry), &FakeStartup).unwrap();
        assert!(update.refresh_tooltip);
        assert!(!update.quit);
        assert!(model.last_error().unwrap().contains("Manage Savings Goals"));
    }

    #[test]
    fn quit_requests_shutdown_only() {
        let mut model = model_with(Box::new(RecordingNavigator::default()));
        let update = model.handle(Command::Quit, &FakeStartup).unwrap();
        assert!(update.quit);
        assert!(!update.refresh_menu);
    }

    #[test]
    fn app_controls_follow_the_popup() {
        let model = model_with(Box::new(RecordingNavigator::default()));
        let spec = model.menu_spec();
        assert!(matches!(spec.items[0], MenuItem::Submenu { .. }));
        assert!(matches!(spec.items[1], MenuItem::Separator));
        let quit = spec.items.last().unwrap();
        assert!(matches!(quit, MenuItem::Action { id, .. } if *id == CMD_QUIT));
    }
}
