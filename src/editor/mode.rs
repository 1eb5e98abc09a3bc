//! Edit mode state machine

use serde::{Deserialize, Serialize};

/// What a pointer interaction in the viewer does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CctvMode {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Click places a new camera
    #[serde(rename = "add")]
    Add,
    /// Drag moves the selected camera
    #[serde(rename = "move")]
    Move,
    /// Click aims the selected camera
    #[serde(rename = "lookat")]
    LookAt,
    #[serde(rename = "createLine")]
    CreateLine,
    #[serde(rename = "addLine")]
    AddLine,
}

impl CctvMode {
    pub const ALL: [CctvMode; 6] = [
        CctvMode::None,
        CctvMode::Add,
        CctvMode::Move,
        CctvMode::LookAt,
        CctvMode::CreateLine,
        CctvMode::AddLine,
    ];

    /// Whether requesting `to` while in `self` changes the mode
    pub fn can_transition(self, to: CctvMode) -> bool {
        use CctvMode::*;
        match self {
            None => true,
            Add => matches!(to, None | LookAt | Move | CreateLine),
            Move => matches!(to, None | LookAt | CreateLine),
            LookAt => matches!(to, None | Add | Move | CreateLine),
            CreateLine => matches!(to, None | Add | Move | LookAt | AddLine),
            AddLine => true,
        }
    }
}

/// Effect of a transition on the selected camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionEffect {
    Keep,
    /// Take the request's selection, if it carries one
    Update,
    Clear,
}

fn selection_effect(from: CctvMode, to: CctvMode) -> SelectionEffect {
    match (from, to) {
        (CctvMode::None, CctvMode::None)
        | (CctvMode::Add, CctvMode::None)
        | (CctvMode::Add, CctvMode::LookAt) => SelectionEffect::Update,
        (CctvMode::None, CctvMode::Add) => SelectionEffect::Clear,
        _ => SelectionEffect::Keep,
    }
}

/// Current mode and the camera it acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeMachine {
    mode: CctvMode,
    selected_camera: Option<String>,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CctvMode {
        self.mode
    }

    pub fn selected_camera(&self) -> Option<&str> {
        self.selected_camera.as_deref()
    }

    /// Request a mode change. Returns false and leaves everything untouched
    /// when the current mode does not allow it.
    pub fn transition(&mut self, to: CctvMode, selection: Option<&str>) -> bool {
        let from = self.mode;
        if !from.can_transition(to) {
            log::debug!("Ignoring mode change {:?} -> {:?}", from, to);
            return false;
        }
        match selection_effect(from, to) {
            SelectionEffect::Keep => {}
            SelectionEffect::Update => {
                if let Some(name) = selection {
                    self.selected_camera = Some(name.to_string());
                }
            }
            SelectionEffect::Clear => self.selected_camera = None,
        }
        self.mode = to;
        true
    }

    /// Change the selection without changing mode. Allowed in every mode.
    pub fn select(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            self.selected_camera = Some(name.to_string());
        }
    }

    /// Forget the selection if it names `camera`
    pub fn deselect(&mut self, camera: &str) {
        if self.selected_camera.as_deref() == Some(camera) {
            self.selected_camera = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::none_to_anything(CctvMode::None, CctvMode::AddLine, true)]
    #[case::add_to_lookat(CctvMode::Add, CctvMode::LookAt, true)]
    #[case::add_to_add_line(CctvMode::Add, CctvMode::AddLine, false)]
    #[case::move_to_add(CctvMode::Move, CctvMode::Add, false)]
    #[case::move_to_itself(CctvMode::Move, CctvMode::Move, false)]
    #[case::lookat_to_add_line(CctvMode::LookAt, CctvMode::AddLine, false)]
    #[case::create_line_to_add_line(CctvMode::CreateLine, CctvMode::AddLine, true)]
    #[case::add_line_to_itself(CctvMode::AddLine, CctvMode::AddLine, true)]
    fn test_transition_table(#[case] from: CctvMode, #[case] to: CctvMode, #[case] allowed: bool) {
        assert_eq!(from.can_transition(to), allowed);
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut machine = ModeMachine::new();
        assert!(machine.transition(CctvMode::Move, Some("cam")));
        assert_eq!(machine.selected_camera(), None);
        assert!(!machine.transition(CctvMode::Add, None));
        assert_eq!(machine.mode(), CctvMode::Move);
    }

    #[test]
    fn test_add_clears_and_lookat_updates_selection() {
        let mut machine = ModeMachine::new();
        machine.select(Some("old"));
        assert!(machine.transition(CctvMode::Add, Some("ignored")));
        assert_eq!(machine.selected_camera(), None);

        assert!(machine.transition(CctvMode::LookAt, Some("cam 1")));
        assert_eq!(machine.selected_camera(), Some("cam 1"));

        // LookAt -> Move keeps whatever was selected
        assert!(machine.transition(CctvMode::Move, Some("other")));
        assert_eq!(machine.selected_camera(), Some("cam 1"));
    }

    #[test]
    fn test_mode_names_match_host_strings() {
        assert_eq!(serde_json::to_string(&CctvMode::LookAt).unwrap(), "\"lookat\"");
        let mode: CctvMode = serde_json::from_str("\"createLine\"").unwrap();
        assert_eq!(mode, CctvMode::CreateLine);
    }
}
