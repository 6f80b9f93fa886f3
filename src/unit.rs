use serde::{Deserialize, Serialize};

/// Unit status as reported by the local service manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStatus {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

impl UnitStatus {
    pub fn new(
        load_state: impl Into<String>,
        active_state: impl Into<String>,
        sub_state: impl Into<String>,
    ) -> Self {
        Self {
            load_state: load_state.into(),
            active_state: active_state.into(),
            sub_state: sub_state.into(),
        }
    }
}

/// Decoded unit state carried by `UnitStateUpdated` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    pub load_state: String,
    pub active_state: String,
    pub sub_state: String,
}

impl From<&UnitStatus> for UnitState {
    fn from(status: &UnitStatus) -> Self {
        Self {
            load_state: status.load_state.clone(),
            active_state: status.active_state.clone(),
            sub_state: status.sub_state.clone(),
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.load_state, self.active_state, self.sub_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status() {
        let status = UnitStatus::new("loaded", "active", "running");
        let state = UnitState::from(&status);
        assert_eq!(state.to_string(), "loaded/active/running");
    }

    #[test]
    fn test_inactive() {
        let state = UnitState::from(&UnitStatus::new("loaded", "inactive", "dead"));
        assert_eq!(state.active_state, "inactive");
        assert_eq!(state.sub_state, "dead");
    }
}
