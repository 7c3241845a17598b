/// Run state of a session's backend device.
///
/// State transitions:
/// ```text
/// create → stopped ⇄ running → destroyed
/// ```
/// Creation and destruction are expressed by the session value existing;
/// only the stopped/running toggle is observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Running,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}
