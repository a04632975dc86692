use anyhow::{anyhow, Context, Result};
use url::Url;

/// Title of the single top-level popup in the menu bar.
pub const MENU_TITLE: &str = "Data Administration";

/// One clickable entry: a label bound to a relative navigation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavEntry {
    pub id: &'static str,
    pub label: &'static str,
    /// Relative URL, resolved against the configured base.
    pub target: &'static str,
}

/// The Data Administration entries. Order is display order (top to bottom).
pub const ENTRIES: [NavEntry; 3] = [
    NavEntry {
        id: "addSavingsGoal",
        label: "Manage Savings Goals",
        target: "startAddSavingsGoalWorkflow",
    },
    NavEntry {
        id: "manageDeposits",
        label: "Manage Deposits",
        target: "getUnallocatedDeposits",
    },
    NavEntry {
        id: "manageTransactions",
        label: "Manage Transaction",
        target: "manageTransactions",
    },
];

pub fn find(id: &str) -> Option<&'static NavEntry> {
    ENTRIES.iter().find(|e| e.id == id)
}

/// Resolves a user-supplied value (entry id or label, case-insensitive) to
/// an entry.
pub fn parse_entry(value: &str) -> Result<&'static NavEntry> {
    let needle = value.to_ascii_lowercase();
    if let Some(entry) = ENTRIES
        .iter()
        .find(|e| e.id.to_ascii_lowercase() == needle || e.label.to_ascii_lowercase() == needle)
    {
        return Ok(entry);
    }

    let known = ENTRIES.iter().map(|e| e.id).collect::<Vec<_>>();
    Err(anyhow!(
        "Unknown entry '{value}'. Known entries: {}",
        known.join(", ")
    ))
}

/// Joins the entry's relative target against the base URL, i.e. navigation
/// relative to the document the base points at.
pub fn resolve_url(base: &Url, entry: &NavEntry) -> Result<Url> {
    base.join(entry.target)
        .with_context(|| format!("resolve '{}' against {base}", entry.target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_in_display_order() {
        let labels = ENTRIES.iter().map(|e| e.label).collect::<Vec<_>>();
        assert_eq!(
            labels,
            ["Manage Savings Goals", "Manage Deposits", "Manage Transaction"]
        );
    }

    #[test]
    fn entry_targets_are_fixed() {
        assert_eq!(find("addSavingsGoal").unwrap().target, "startAddSavingsGoalWorkflow");
        assert_eq!(find("manageDeposits").unwrap().target, "getUnallocatedDeposits");
        assert_eq!(find("manageTransactions").unwrap().target, "manageTransactions");
        assert!(find("addIncome").is_none());
    }

    #[test]
    fn parse_entry_accepts_id_and_label() {
        assert_eq!(parse_entry("manageDeposits").unwrap().id, "manageDeposits");
        assert_eq!(parse_entry("manage deposits").unwrap().id, "manageDeposits");
        assert_eq!(parse_entry("MANAGETRANSACTIONS").unwrap().id, "manageTransactions");
    }

    #[test]
    fn parse_entry_lists_known_ids_on_miss() {
        let err = parse_entry("budget").unwrap_err().to_string();
        assert!(err.contains("addSavingsGoal"));
        assert!(err.contains("manageDeposits"));
        assert!(err.contains("manageTransactions"));
    }

    #[test]
    fn resolve_url_appends_target() {
        let base = Url::parse("http://localhost:8080/").unwrap();
        let url = resolve_url(&base, &ENTRIES[2]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/manageTransactions");
    }

    #[test]
    fn resolve_url_respects_base_path() {
        let base = Url::parse("https://budget.example.com/app/").unwrap();
        let url = resolve_url(&base, &ENTRIES[0]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://budget.example.com/app/startAddSavingsGoalWorkflow"
        );
    }
}
