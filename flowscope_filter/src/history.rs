//! Persisted filter history: `~/.netflow-filter-history`, newline
//! separated, most recent first, capped at [`MAX_HISTORY`] entries.

use std::path::PathBuf;
use tracing::debug;

pub const MAX_HISTORY: usize = 20;
const HISTORY_FILE: &str = ".netflow-filter-history";

fn history_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

pub fn load_history() -> Vec<String> {
    let Ok(contents) = std::fs::read_to_string(history_path()) else {
        return Vec::new();
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn save_history(history: &[String]) {
    let mut contents = history.join("\n");
    contents.push('\n');
    if let Err(e) = std::fs::write(history_path(), contents) {
        debug!("Could not save filter history: {e}");
    }
}

/// Inserts a newly applied filter at the front of the history, unless it is
/// already present, and enforces the size cap. Returns true if the history
/// changed and should be saved.
pub fn remember(history: &mut Vec<String>, entry: &str) -> bool {
    let entry = entry.trim();
    if entry.is_empty() || history.iter().any(|h| h == entry) {
        return false;
    }
    history.insert(0, entry.to_string());
    history.truncate(MAX_HISTORY);
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_remember_inserts_at_front() {
        let mut history = vec!["old".to_string()];
        assert!(remember(&mut history, "new"));
        assert_eq!(history, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_remember_skips_duplicates_and_empties() {
        let mut history = vec!["a".to_string()];
        assert!(!remember(&mut history, "a"));
        assert!(!remember(&mut history, "  "));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_remember_caps_length() {
        let mut history: Vec<String> = (0..MAX_HISTORY).map(|i| i.to_string()).collect();
        assert!(remember(&mut history, "newest"));
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0], "newest");
    }
}
