//! Input actions
//!
//! Actions are declared in a JSON manifest and bound to gamepad buttons and
//! sticks. `GamepadInput` polls gilrs into a snapshot once per frame and the
//! `ActionRegistry` turns that snapshot into per-action state any part of the
//! player can query.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use glam::Vec2;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::error::{PlayerError, Result};

/// Digital action that recenters the view while held
pub const RESET_ACTION: &str = "/actions/demo/in/HideCubes";
pub const HIDE_CONTROLLER_ACTION: &str = "/actions/demo/in/HideThisController";
pub const TRIGGER_HAPTIC_ACTION: &str = "/actions/demo/in/TriggerHaptic";
pub const ANALOG_ACTION: &str = "/actions/demo/in/AnalogInput";

const STICK_DEADZONE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Boolean,
    Vector2,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindingDecl {
    pub action: String,
    /// gilrs button name (`South`, `RightTrigger2`, ...) or `LeftStick`/`RightStick`
    pub input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionManifest {
    pub actions: Vec<ActionDecl>,
    #[serde(default)]
    pub bindings: Vec<BindingDecl>,
}

impl ActionManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let manifest = Self::from_json(&json)?;
        info!("Loaded {} actions from {}", manifest.actions.len(), path.display());
        Ok(manifest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Button(Button),
    Stick(Stick),
}

impl InputSource {
    pub fn parse(name: &str) -> Option<Self> {
        let button = match name {
            "LeftStick" => return Some(Self::Stick(Stick::Left)),
            "RightStick" => return Some(Self::Stick(Stick::Right)),
            "South" => Button::South,
            "East" => Button::East,
            "North" => Button::North,
            "West" => Button::West,
            "LeftTrigger" => Button::LeftTrigger,
            "LeftTrigger2" => Button::LeftTrigger2,
            "RightTrigger" => Button::RightTrigger,
            "RightTrigger2" => Button::RightTrigger2,
            "Select" => Button::Select,
            "Start" => Button::Start,
            "Mode" => Button::Mode,
            "LeftThumb" => Button::LeftThumb,
            "RightThumb" => Button::RightThumb,
            "DPadUp" => Button::DPadUp,
            "DPadDown" => Button::DPadDown,
            "DPadLeft" => Button::DPadLeft,
            "DPadRight" => Button::DPadRight,
            _ => return None,
        };
        Some(Self::Button(button))
    }

    fn kind(self) -> ActionKind {
        match self {
            Self::Button(_) => ActionKind::Boolean,
            Self::Stick(_) => ActionKind::Vector2,
        }
    }
}

/// Gamepad state sampled once per frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub connected: bool,
    pub pressed: HashSet<Button>,
    pub left_stick: Vec2,
    pub right_stick: Vec2,
}

impl GamepadSnapshot {
    fn stick(&self, stick: Stick) -> Vec2 {
        match stick {
            Stick::Left => self.left_stick,
            Stick::Right => self.right_stick,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalActionData {
    /// Bound and a gamepad is connected
    pub active: bool,
    pub state: bool,
    /// State differs from the previous update
    pub changed: bool,
}

impl DigitalActionData {
    pub fn rising_edge(&self) -> bool {
        self.state && self.changed
    }

    pub fn falling_edge(&self) -> bool {
        !self.state && self.changed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalogActionData {
    pub active: bool,
    pub value: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionState {
    Digital(DigitalActionData),
    Analog(AnalogActionData),
}

struct RegisteredAction {
    state: ActionState,
    sources: Vec<InputSource>,
}

/// State of every action in the manifest
pub struct ActionRegistry {
    actions: BTreeMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn from_manifest(manifest: &ActionManifest) -> Result<Self> {
        let mut actions = BTreeMap::new();

        for decl in &manifest.actions {
            let state = match decl.kind {
                ActionKind::Boolean => ActionState::Digital(DigitalActionData::default()),
                ActionKind::Vector2 => ActionState::Analog(AnalogActionData::default()),
            };
            let registered = RegisteredAction { state, sources: Vec::new() };
            if actions.insert(decl.name.clone(), registered).is_some() {
                return Err(PlayerError::Binding(format!("duplicate action {}", decl.name)));
            }
        }

        for binding in &manifest.bindings {
            let action = actions.get_mut(&binding.action).ok_or_else(|| {
                PlayerError::Binding(format!("binding for undeclared action {}", binding.action))
            })?;
            let source = InputSource::parse(&binding.input).ok_or_else(|| {
                PlayerError::Binding(format!("unknown input {} for {}", binding.input, binding.action))
            })?;
            let expected = match action.state {
                ActionState::Digital(_) => ActionKind::Boolean,
                ActionState::Analog(_) => ActionKind::Vector2,
            };
            if source.kind() != expected {
                return Err(PlayerError::Binding(format!(
                    "{} cannot drive {:?} action {}",
                    binding.input, expected, binding.action
                )));
            }
            action.sources.push(source);
        }

        for (name, action) in &actions {
            if action.sources.is_empty() {
                debug!("action {name} has no bindings");
            }
        }

        Ok(Self { actions })
    }

    /// Recompute every action from this frame's gamepad snapshot.
    pub fn update(&mut self, snapshot: &GamepadSnapshot) {
        for action in self.actions.values_mut() {
            let active = snapshot.connected && !action.sources.is_empty();
            match &mut action.state {
                ActionState::Digital(data) => {
                    let state = active
                        && action.sources.iter().any(|source| match source {
                            InputSource::Button(button) => snapshot.pressed.contains(button),
                            InputSource::Stick(_) => false,
                        });
                    *data = DigitalActionData {
                        active,
                        state,
                        changed: state != data.state,
                    };
                }
                ActionState::Analog(data) => {
                    let value = if active {
                        action
                            .sources
                            .iter()
                            .filter_map(|source| match source {
                                InputSource::Stick(stick) => Some(snapshot.stick(*stick)),
                                InputSource::Button(_) => None,
                            })
                            .fold(Vec2::ZERO, |acc, v| if v.length_squared() > acc.length_squared() { v } else { acc })
                    } else {
                        Vec2::ZERO
                    };
                    *data = AnalogActionData { active, value };
                }
            }
        }
    }

    pub fn state(&self, name: &str) -> Option<ActionState> {
        self.actions.get(name).map(|action| action.state)
    }

    pub fn digital(&self, name: &str) -> Option<DigitalActionData> {
        match self.state(name)? {
            ActionState::Digital(data) => Some(data),
            ActionState::Analog(_) => None,
        }
    }

    pub fn analog(&self, name: &str) -> Option<AnalogActionData> {
        match self.state(name)? {
            ActionState::Analog(data) => Some(data),
            ActionState::Digital(_) => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

/// Polls gilrs and keeps the latest gamepad snapshot
pub struct GamepadInput {
    gilrs: Option<Gilrs>,
    snapshot: GamepadSnapshot,
}

impl GamepadInput {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Gamepad system initialized");
                Some(g)
            }
            Err(e) => {
                warn!("No gamepad support: {:?}", e);
                None
            }
        };

        let connected = gilrs
            .as_ref()
            .is_some_and(|g| g.gamepads().any(|(_, pad)| pad.is_connected()));

        Self {
            gilrs,
            snapshot: GamepadSnapshot {
                connected,
                ..GamepadSnapshot::default()
            },
        }
    }

    /// Drain pending gamepad events into the snapshot.
    pub fn update(&mut self) -> &GamepadSnapshot {
        // Collect events first to avoid borrowing gilrs and self together
        let events: Vec<_> = if let Some(gilrs) = &mut self.gilrs {
            let mut events = Vec::new();
            while let Some(Event { event, .. }) = gilrs.next_event() {
                events.push(event);
            }
            events
        } else {
            Vec::new()
        };

        for event in events {
            self.apply(event);
        }

        &self.snapshot
    }

    pub fn snapshot(&self) -> &GamepadSnapshot {
        &self.snapshot
    }

    fn apply(&mut self, event: EventType) {
        debug!("gamepad event: {:?}", event);
        match event {
            EventType::Connected => {
                info!("Gamepad connected");
                self.snapshot.connected = true;
            }
            EventType::Disconnected => {
                info!("Gamepad disconnected");
                self.snapshot = GamepadSnapshot::default();
            }
            EventType::ButtonPressed(button, _) => {
                self.snapshot.pressed.insert(button);
            }
            EventType::ButtonReleased(button, _) => {
                self.snapshot.pressed.remove(&button);
            }
            EventType::AxisChanged(axis, value, _) => self.handle_axis(axis, value),
            _ => {}
        }
    }

    fn handle_axis(&mut self, axis: Axis, value: f32) {
        let value = if value.abs() < STICK_DEADZONE { 0.0 } else { value };

        match axis {
            Axis::LeftStickX => self.snapshot.left_stick.x = value,
            Axis::LeftStickY => self.snapshot.left_stick.y = value,
            Axis::RightStickX => self.snapshot.right_stick.x = value,
            Axis::RightStickY => self.snapshot.right_stick.y = value,
            _ => {}
        }
    }
}

impl Default for GamepadInput {
    fn default() -> Self {
        Self::new()
    }
}
