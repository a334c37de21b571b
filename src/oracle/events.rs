/// Hook events reported to the host's log sink

/// Log target for adapter events
pub const EVENT_TARGET: &str = "oracle_adapter::events";

/// Informational event about a statement run on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    pub msg: String,
    pub code: &'static str,
}

impl HookInfo {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            code: "E040",
        }
    }

    pub fn message(&self) -> String {
        format!("{}.", self.msg)
    }
}

/// Emits an event through the `log` facade at info level
pub fn fire_event(event: &HookInfo) {
    log::info!(target: EVENT_TARGET, "[{}] {}", event.code, event.message());
}
