//! Joystick actions: axis moves and button presses on a virtual device

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device targeted by a freshly created action
pub const DEFAULT_DEVICE_ID: u8 = 1;

/// Axes exposed by a virtual joystick, in report slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisName {
    X,
    Y,
    Z,
    XRot,
    YRot,
    ZRot,
    Slider,
    Dial,
    Throttle,
    Rudder,
    Aileron,
    Wheel,
    Accelerator,
    Brake,
    Clutch,
    Steering,
}

impl AxisName {
    /// Number of axis slots in a report
    pub const COUNT: usize = 16;

    /// All axes, indexed by report slot
    pub fn all() -> &'static [AxisName; Self::COUNT] {
        &[
            AxisName::X,
            AxisName::Y,
            AxisName::Z,
            AxisName::XRot,
            AxisName::YRot,
            AxisName::ZRot,
            AxisName::Slider,
            AxisName::Dial,
            AxisName::Throttle,
            AxisName::Rudder,
            AxisName::Aileron,
            AxisName::Wheel,
            AxisName::Accelerator,
            AxisName::Brake,
            AxisName::Clutch,
            AxisName::Steering,
        ]
    }

    /// Report slot of this axis
    pub fn index(self) -> usize {
        self as usize
    }

    /// Axes that rest at the bottom of their range instead of centered
    pub fn rests_at_minimum(self) -> bool {
        matches!(
            self,
            AxisName::Slider
                | AxisName::Dial
                | AxisName::Throttle
                | AxisName::Wheel
                | AxisName::Accelerator
                | AxisName::Brake
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisName::X => "X",
            AxisName::Y => "Y",
            AxisName::Z => "Z",
            AxisName::XRot => "XRot",
            AxisName::YRot => "YRot",
            AxisName::ZRot => "ZRot",
            AxisName::Slider => "Slider",
            AxisName::Dial => "Dial",
            AxisName::Throttle => "Throttle",
            AxisName::Rudder => "Rudder",
            AxisName::Aileron => "Aileron",
            AxisName::Wheel => "Wheel",
            AxisName::Accelerator => "Accelerator",
            AxisName::Brake => "Brake",
            AxisName::Clutch => "Clutch",
            AxisName::Steering => "Steering",
        }
    }
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AxisName::all()
            .iter()
            .copied()
            .find(|axis| axis.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown axis: {}", s))
    }
}

/// 1-based button number on a virtual joystick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ButtonNumber(u8);

impl ButtonNumber {
    /// Highest button number a report can carry
    pub const MAX: u8 = 128;

    /// Returns `None` outside `1..=MAX`
    pub fn new(number: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&number).then_some(Self(number))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Bit position in the button mask (`number - 1`)
    pub fn bit_index(self) -> u32 {
        u32::from(self.0 - 1)
    }

    /// Single-bit mask for this button
    pub fn mask(self) -> u128 {
        1u128 << self.bit_index()
    }
}

impl Default for ButtonNumber {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for ButtonNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "button number {} out of range 1..={}",
                value,
                ButtonNumber::MAX
            )
        })
    }
}

impl From<ButtonNumber> for u8 {
    fn from(value: ButtonNumber) -> Self {
        value.0
    }
}

impl fmt::Display for ButtonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    None,
    Axis,
    Button,
}

/// How an axis action computes its target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSubtype {
    /// Jump to `percent` of the axis range
    #[default]
    Absolute,
    /// One raw step up
    Increment,
    /// One raw step down
    Decrement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonSubtype {
    #[default]
    Press,
    Release,
    /// Press, hold briefly, release
    Click,
    /// Pressed while the control reads above its minimum
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAction {
    pub name: AxisName,
    /// Target position in `0.0..=1.0` (absolute subtype only)
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub subtype: AxisSubtype,
}

impl AxisAction {
    pub fn absolute(name: AxisName, percent: f64) -> Self {
        Self {
            name,
            percent,
            subtype: AxisSubtype::Absolute,
        }
    }

    pub fn step(name: AxisName, subtype: AxisSubtype) -> Self {
        Self {
            name,
            percent: 0.0,
            subtype,
        }
    }
}

impl Default for AxisAction {
    fn default() -> Self {
        Self::absolute(AxisName::X, 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonAction {
    pub number: ButtonNumber,
    #[serde(default)]
    pub subtype: ButtonSubtype,
    /// Resolved on/off state (meaningful for `Auto`)
    #[serde(default)]
    pub logical_on: bool,
}

impl ButtonAction {
    pub fn new(number: ButtonNumber, subtype: ButtonSubtype) -> Self {
        Self {
            number,
            subtype,
            logical_on: subtype == ButtonSubtype::Press,
        }
    }

    /// Whether the button bit ends up set for a non-click action
    pub fn is_on(&self) -> bool {
        match self.subtype {
            ButtonSubtype::Press => true,
            ButtonSubtype::Release => false,
            ButtonSubtype::Auto | ButtonSubtype::Click => self.logical_on,
        }
    }
}

/// Action applied to a single joystick device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JoystickAction {
    /// 1-based virtual device id
    pub device_id: u8,
    pub kind: ActionKind,
    #[serde(default)]
    pub axis: AxisAction,
    #[serde(default)]
    pub button: ButtonAction,
}

impl JoystickAction {
    pub fn axis(device_id: u8, axis: AxisAction) -> Self {
        Self {
            device_id,
            kind: ActionKind::Axis,
            axis,
            button: ButtonAction::default(),
        }
    }

    pub fn button(device_id: u8, button: ButtonAction) -> Self {
        Self {
            device_id,
            kind: ActionKind::Button,
            axis: AxisAction::default(),
            button,
        }
    }

    /// The sub-action a feeder applies, `None` for `ActionKind::None`
    pub fn feeder_action(&self) -> Option<FeederAction> {
        match self.kind {
            ActionKind::None => None,
            ActionKind::Axis => Some(FeederAction::Axis(self.axis)),
            ActionKind::Button => Some(FeederAction::Button(self.button)),
        }
    }
}

impl Default for JoystickAction {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            kind: ActionKind::None,
            axis: AxisAction::default(),
            button: ButtonAction::default(),
        }
    }
}

/// What a feeder is asked to apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeederAction {
    Axis(AxisAction),
    Button(ButtonAction),
}
