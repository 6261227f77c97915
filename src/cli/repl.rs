//! Slash commands understood by the interactive chat loop.

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Plain text sent to the workflow.
    Message(String),
    /// List every session with details.
    Sessions,
    /// Registry counters.
    Stats,
    /// Print the current session's checkpoint as JSON.
    Export,
    /// Drop the current session's checkpoint.
    Evict,
    /// Continue under another session id.
    Switch(String),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };
        let mut parts = rest.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
        match (command, arg) {
            ("sessions", None) => Self::Sessions,
            ("stats", None) => Self::Stats,
            ("export", None) => Self::Export,
            ("evict", None) => Self::Evict,
            ("switch", Some(id)) => Self::Switch(id.to_string()),
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
/sessions        list sessions
/stats           registry counters
/export          print this session as JSON
/evict           forget this session
/switch <id>     continue under another session id
/quit            leave";
