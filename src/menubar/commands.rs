use std::collections::BTreeMap;

use crate::nav::NavEntry;

pub const CMD_BASE_ENTRY: u16 = 2000;
pub const CMD_RELOAD: u16 = 5000;
pub const CMD_QUIT: u16 = 5001;
pub const CMD_TOGGLE_STARTUP: u16 = 5002;
pub const CMD_EDIT_CONFIG: u16 = 5003;
pub const CMD_OPEN_CONFIG_FOLDER: u16 = 5004;

/// Menu command id -> navigation entry.
pub type EntriesMap = BTreeMap<u16, NavEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Navigate(NavEntry),
    Reload,
    Quit,
    ToggleStartup,
    EditConfig,
    OpenConfigFolder,
}

pub fn decode(cmd_id: u16, entries: &EntriesMap) -> Option<Command> {
    if let Some(entry) = entries.get(&cmd_id) {
        return Some(Command::Navigate(*entry));
    }

    match cmd_id {
        CMD_RELOAD => Some(Command::Reload),
        CMD_QUIT => Some(Command::Quit),
        CMD_TOGGLE_STARTUP => Some(Command::ToggleStartup),
        CMD_EDIT_CONFIG => Some(Command::EditConfig),
        CMD_OPEN_CONFIG_FOLDER => Some(Command::OpenConfigFolder),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menubar::common;

    #[test]
    fn decodes_entry_commands() {
        let entries = common::build_entries(CMD_BASE_ENTRY);
        let cmd = decode(CMD_BASE_ENTRY + 1, &entries).unwrap();
        match cmd {
            Command::Navigate(entry) => assert_eq!(entry.id, "manageDeposits"),
            other => panic!("expected Navigate, got {other:?}"),
        }
    }

    #[test]
    fn decodes_fixed_commands() {
        let entries = common::build_entries(CMD_BASE_ENTRY);
        assert_eq!(decode(CMD_QUIT, &entries), Some(Command::Quit));
        assert_eq!(decode(CMD_RELOAD, &entries), Some(Command::Reload));
        assert_eq!(
            decode(CMD_TOGGLE_STARTUP, &entries),
            Some(Command::ToggleStartup)
        );
    }

    #[test]
    fn unknown_ids_decode_to_none() {
        let entries = common::build_entries(CMD_BASE_ENTRY);
        assert_eq!(decode(0, &entries), None);
        assert_eq!(decode(CMD_BASE_ENTRY + 99, &entries), None);
    }
}
