//! Editor state shared with the host UI
//!
//! Holds the edit mode and a queue of events the host drains after each
//! interaction. Nothing here touches the GPU.

mod mode;

pub use mode::*;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Notification for the host UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ViewerEvent {
    /// The floor plan is in the scene
    #[serde(rename = "modelReady")]
    ModelReady,
    /// A camera was added, moved, aimed or reconfigured
    #[serde(rename = "cctvChange")]
    CameraChanged(String),
    #[serde(rename = "cctvDel")]
    CameraRemoved(String),
    #[serde(rename = "modeChange")]
    ModeChanged(CctvMode),
}

#[derive(Debug, Default)]
pub struct Editor {
    modes: ModeMachine,
    events: VecDeque<ViewerEvent>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> CctvMode {
        self.modes.mode()
    }

    pub fn selected_camera(&self) -> Option<&str> {
        self.modes.selected_camera()
    }

    /// Request a mode change, queueing `ModeChanged` when it is accepted
    pub fn set_mode(&mut self, mode: CctvMode, selection: Option<&str>) -> bool {
        let changed = self.modes.transition(mode, selection);
        if changed {
            self.events.push_back(ViewerEvent::ModeChanged(mode));
        }
        changed
    }

    pub fn select(&mut self, name: Option<&str>) {
        self.modes.select(name);
    }

    pub fn camera_changed(&mut self, name: &str) {
        self.events.push_back(ViewerEvent::CameraChanged(name.to_string()));
    }

    pub fn camera_removed(&mut self, name: &str) {
        self.modes.deselect(name);
        self.events.push_back(ViewerEvent::CameraRemoved(name.to_string()));
    }

    pub fn model_ready(&mut self) {
        self.events.push_back(ViewerEvent::ModelReady);
    }

    /// Take every queued event, oldest first
    pub fn drain_events(&mut self) -> impl Iterator<Item = ViewerEvent> + '_ {
        self.events.drain(..)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_drained_in_order() {
        let mut editor = Editor::new();
        editor.model_ready();
        assert!(editor.set_mode(CctvMode::Add, None));
        editor.camera_changed("cam");

        let events: Vec<_> = editor.drain_events().collect();
        assert_eq!(
            events,
            vec![
                ViewerEvent::ModelReady,
                ViewerEvent::ModeChanged(CctvMode::Add),
                ViewerEvent::CameraChanged("cam".into()),
            ]
        );
        assert_eq!(editor.pending_events(), 0);
    }

    #[test]
    fn test_events_serialize_with_host_names() {
        let json = serde_json::to_string(&ViewerEvent::CameraRemoved("cam".into())).unwrap();
        assert_eq!(json, r#"{"type":"cctvDel","value":"cam"}"#);
        let json = serde_json::to_string(&ViewerEvent::ModelReady).unwrap();
        assert_eq!(json, r#"{"type":"modelReady"}"#);
    }

    #[test]
    fn test_ignored_mode_change_queues_nothing() {
        let mut editor = Editor::new();
        editor.set_mode(CctvMode::Move, None);
        editor.drain_events().for_each(drop);
        assert!(!editor.set_mode(CctvMode::Add, None));
        assert_eq!(editor.pending_events(), 0);
    }

    #[test]
    fn test_removing_selected_camera_clears_selection() {
        let mut editor = Editor::new();
        editor.select(Some("cam"));
        editor.camera_removed("cam");
        assert_eq!(editor.selected_camera(), None);
    }
}
