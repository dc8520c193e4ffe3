use colored::{ColoredString, Colorize};
use reconcile::{Action, Diagnostic, LifecycleState, Severity};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reconciliation Output
// ============================================================================

/// Symbol for what an operation did
pub fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Unchanged => "○".dimmed(),
        Action::Created => "+".green(),
        Action::Updated => "~".yellow(),
        Action::Deleted | Action::Forgotten => "-".red(),
        Action::Imported => "↓".cyan(),
        Action::Unresolved => "?".magenta(),
    }
}

/// Lifecycle state, colored by how settled it is
pub fn state_label(state: LifecycleState) -> ColoredString {
    let label = state.to_string();
    match state {
        LifecycleState::Present => label.green(),
        LifecycleState::Absent => label.dimmed(),
        LifecycleState::Failed => label.red(),
        LifecycleState::PartiallyCreated | LifecycleState::Unknown => label.yellow(),
        _ => label.normal(),
    }
}

/// Print a diagnostic indented under its resource
pub fn diagnostic(diag: &Diagnostic) {
    match diag.severity {
        Severity::Info => println!("    {}", diag.message.dimmed()),
        Severity::Warning => println!("    {} {}", "⚠".yellow(), diag.message),
        Severity::Error => println!("    {} {}", "✗".red(), diag.message),
    }
}

/// Truncate a string for display, keeping the start
pub fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        value.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = value.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
