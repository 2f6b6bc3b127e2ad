use chrono::NaiveDate;

/// Used when neither the channel nor the global config sets a prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a programming assistant helping with codebase \
analysis and development.

CAPABILITIES:
- You can read files using: Read, Grep, Glob, LS, WebSearch
- You can create and edit files using: Write, Edit, MultiEdit
- You can use git commands for reading: git log, git status, git diff, git show
- You can run bash commands and execute code
- Be concise and research-focused in your responses";

/// "Today's date is Friday, October 16, 2026."
pub fn date_line(today: NaiveDate) -> String {
    format!("Today's date is {}.", today.format("%A, %B %-d, %Y"))
}

/// The configured prompt (or the default) under a date line.
pub fn compose_system_prompt(configured: Option<&str>, today: NaiveDate) -> String {
    let body = configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    format!("{}\n\n{body}", date_line(today))
}
