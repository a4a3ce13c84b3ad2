//! Input handling
//!
//! Keys are mapped to [`Command`]s by [`KeyBindings`]; commands travel to the
//! orchestrator through a [`CommandQueue`].

pub mod queue;

pub use queue::{CommandQueue, CommandSender};

use crate::core::config::ControlsConfig;
use crate::scene::{Axis, TransformCommand};

/// Discrete user command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Edit the model transform
    Transform(TransformCommand),
    /// Display a different catalogued model
    SwitchModel(String),
    /// Stop the pipeline
    Exit,
}

impl From<TransformCommand> for Command {
    fn from(command: TransformCommand) -> Self {
        Self::Transform(command)
    }
}

/// Keys the viewer reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Printable character
    Char(char),
    /// Escape
    Escape,
}

impl Key {
    /// Key for a raw byte as delivered by a terminal or windowing layer
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0x1b {
            Self::Escape
        } else {
            Self::Char(char::from(byte))
        }
    }
}

/// Keyboard layout for the transform controls
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    scale_step: f32,
    translate_step: f32,
}

impl KeyBindings {
    /// Bindings with explicit step sizes
    pub fn new(scale_step: f32, translate_step: f32) -> Self {
        Self {
            scale_step,
            translate_step,
        }
    }

    /// Bindings using the configured step sizes
    pub fn from_config(config: &ControlsConfig) -> Self {
        Self::new(config.scale_step, config.translate_step)
    }

    /// Command bound to `key`, if any
    pub fn map(&self, key: Key) -> Option<Command> {
        let step = self.translate_step;
        let command = match key {
            Key::Escape => return Some(Command::Exit),
            Key::Char(c) => match c.to_ascii_lowercase() {
                '+' | '=' => TransformCommand::ScaleBy(self.scale_step),
                '-' => TransformCommand::ScaleBy(-self.scale_step),
                'w' => TransformCommand::TranslateBy(Axis::Y, -step),
                's' => TransformCommand::TranslateBy(Axis::Y, step),
                'a' => TransformCommand::TranslateBy(Axis::X, step),
                'd' => TransformCommand::TranslateBy(Axis::X, -step),
                'q' => TransformCommand::TranslateBy(Axis::Z, step),
                'e' => TransformCommand::TranslateBy(Axis::Z, -step),
                'l' => TransformCommand::ToggleLighting,
                'r' => TransformCommand::Reset,
                _ => return None,
            },
        };
        Some(Command::Transform(command))
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_config(&ControlsConfig::default())
    }
}
