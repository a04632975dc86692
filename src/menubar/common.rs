use crate::menubar::commands::EntriesMap;
use crate::nav;

/// Allocates menu command ids for the navigation entries, preserving table
/// order (BTreeMap iteration order == id order == display order).
pub fn build_entries(base_cmd: u16) -> EntriesMap {
    let mut out = EntriesMap::new();
    let mut next_cmd = base_cmd;
    for entry in nav::ENTRIES {
        out.insert(next_cmd, entry);
        next_cmd += 1;
    }
    out
}

pub fn apply_startup_pref<SetEnabled, IsEnabled, Error>(
    pref: Option<bool>,
    mut set_enabled: SetEnabled,
    mut is_enabled: IsEnabled,
) -> (bool, Option<String>)
where
    SetEnabled: FnMut(bool) -> Result<(), Error>,
    IsEnabled: FnMut() -> Result<bool, Error>,
    Error: std::fmt::Display,
{
    match pref {
        Some(enabled) => match set_enabled(enabled) {
            Ok(()) => (enabled, None),
            Err(e) => (enabled, Some(e.to_string())),
        },
        None => match is_enabled() {
            Ok(enabled) => (enabled, None),
            Err(e) => (false, Some(e.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menubar::commands::CMD_BASE_ENTRY;

    #[test]
    fn entry_ids_are_sequential_in_table_order() {
        let entries = build_entries(CMD_BASE_ENTRY);
        let ids = entries.values().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids, ["addSavingsGoal", "manageDeposits", "manageTransactions"]);
        assert_eq!(
            entries.keys().copied().collect::<Vec<_>>(),
            [CMD_BASE_ENTRY, CMD_BASE_ENTRY + 1, CMD_BASE_ENTRY + 2]
        );
    }

    #[test]
    fn startup_pref_applies_explicit_setting() {
        let mut applied = None;
        let (enabled, err) = apply_startup_pref::<_, _, std::fmt::Error>(
            Some(true),
            |e| {
                applied = Some(e);
                Ok(())
            },
            || Ok(false),
        );
        assert!(enabled);
        assert_eq!(applied, Some(true));
        assert!(err.is_none());
    }

    #[test]
    fn startup_pref_falls_back_to_current_state() {
        let (enabled, err) =
            apply_startup_pref::<_, _, std::fmt::Error>(None, |_| Ok(()), || Ok(true));
        assert!(enabled);
        assert!(err.is_none());
    }

    #[test]
    fn startup_pref_reports_errors() {
        let (enabled, err) =
            apply_startup_pref::<_, _, std::fmt::Error>(None, |_| Ok(()), || Err(std::fmt::Error));
        assert!(!enabled);
        assert!(err.is_some());
    }
}
