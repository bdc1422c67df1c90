//! Input events and button bindings

use std::fmt;

/// A button gesture recognized by the button driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// Single short press
    Click,
    /// Two short presses
    DoubleClick,
    /// Press held past the long-press threshold
    LongPress,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gesture::Click => "click",
            Gesture::DoubleClick => "double click",
            Gesture::LongPress => "long press",
        })
    }
}

/// What the dock does in response to a gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonAction {
    /// Start flashing the current manifest
    Flash,
    /// Search the storage for a manifest again
    Rescan,
    /// Log the current manifest
    Dump,
    /// Do nothing
    Ignore,
}

/// Gesture to action table
///
/// Bound once when the dock is built; there is no way to rebind a gesture
/// while events are flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bindings {
    /// Action for a single click
    pub click: ButtonAction,
    /// Action for a double click
    pub double_click: ButtonAction,
    /// Action for a long press
    pub long_press: ButtonAction,
}

impl Default for Bindings {
    fn default() -> Self {
        Self {
            click: ButtonAction::Flash,
            double_click: ButtonAction::Dump,
            long_press: ButtonAction::Rescan,
        }
    }
}

impl Bindings {
    /// Action bound to `gesture`
    pub fn action(&self, gesture: Gesture) -> ButtonAction {
        match gesture {
            Gesture::Click => self.click,
            Gesture::DoubleClick => self.double_click,
            Gesture::LongPress => self.long_press,
        }
    }
}

/// An event delivered to the dock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockEvent {
    /// The storage transport changed who owns the storage
    StorageVisibility {
        /// True when the host has claimed the storage
        externally_visible: bool,
    },
    /// The button driver recognized a gesture
    Button(Gesture),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = Bindings::default();
        assert_eq!(bindings.action(Gesture::Click), ButtonAction::Flash);
        assert_eq!(bindings.action(Gesture::DoubleClick), ButtonAction::Dump);
        assert_eq!(bindings.action(Gesture::LongPress), ButtonAction::Rescan);
    }
}
