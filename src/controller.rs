/*!
 * Game controller input.
 *
 * The adapter is polled once per frame while connected. A button triggers its
 * action on the poll where it goes from released to pressed, and all actions
 * share one cooldown window. A failed read disconnects the device.
 */

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::app_config::ControllerConfig;
use crate::errors::EngineError;

/// A controller that reports its buttons as a pressed/released array
pub trait ControllerDevice: Send + std::fmt::Debug {
    /// Human-readable device name
    fn id(&self) -> String;

    /// Current state of every button
    fn read_buttons(&mut self) -> Result<Vec<bool>, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Connected,
}

/// Primitive a button press maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerAction {
    Next,
    Previous,
    PlayPause,
    ToggleTranslation,
}

/// Edge-triggered mapping from controller buttons to reader actions
#[derive(Debug)]
pub struct ControllerInputAdapter {
    mapping: [(usize, ControllerAction); 4],
    cooldown: Duration,
    device: Option<Box<dyn ControllerDevice>>,
    previous: Vec<bool>,
    last_trigger: Option<Instant>,
}

impl ControllerInputAdapter {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            mapping: [
                (config.next_button, ControllerAction::Next),
                (config.play_pause_button, ControllerAction::PlayPause),
                (config.previous_button, ControllerAction::Previous),
                (config.toggle_translation_button, ControllerAction::ToggleTranslation),
            ],
            cooldown: Duration::from_millis(config.cooldown_ms),
            device: None,
            previous: Vec::new(),
            last_trigger: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.device.is_some() {
            ControllerState::Connected
        } else {
            ControllerState::Disconnected
        }
    }

    /// Attach a device. Buttons already held at connect time do not trigger.
    pub fn connect(&mut self, mut device: Box<dyn ControllerDevice>) -> Result<(), EngineError> {
        let buttons = device.read_buttons()?;
        info!("Controller connected: {}", device.id());
        self.previous = buttons;
        self.last_trigger = None;
        self.device = Some(device);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(device) = self.device.take() {
            info!("Controller disconnected: {}", device.id());
        }
        self.previous.clear();
    }

    /// Read the device once and return the actions triggered on this frame
    pub fn poll(&mut self, now: Instant) -> Vec<ControllerAction> {
        let Some(device) = self.device.as_mut() else {
            return Vec::new();
        };
        let buttons = match device.read_buttons() {
            Ok(buttons) => buttons,
            Err(e) => {
                warn!("Lost controller {}: {}", device.id(), e);
                self.disconnect();
                return Vec::new();
            }
        };

        let mut actions = Vec::new();
        for (button, action) in self.mapping {
            let pressed = buttons.get(button).copied().unwrap_or(false);
            let was_pressed = self.previous.get(button).copied().unwrap_or(false);
            if !pressed || was_pressed {
                continue;
            }
            let cooled_down = self
                .last_trigger
                .is_none_or(|last| now.saturating_duration_since(last) > self.cooldown);
            if cooled_down {
                debug!("Controller button {} -> {:?}", button, action);
                actions.push(action);
                self.last_trigger = Some(now);
            } else {
                debug!("Controller button {} ignored during cooldown", button);
            }
        }
        self.previous = buttons;
        actions
    }
}
