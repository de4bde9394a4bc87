//! Control descriptors produced by control enumeration.

/// Kind of value a control holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// Signed integer in `[minimum, maximum]`.
    Integer,
    /// On/off.
    Boolean,
    /// Index into a list of named menu entries.
    Menu,
    /// Action trigger with no value.
    Button,
    /// 64-bit integer.
    Integer64,
    /// Control class marker (group heading).
    Class,
    /// Text value.
    String,
    /// Bit set.
    Bitmask,
    /// Index into a list of 64-bit integer menu entries.
    IntegerMenu,
    /// A type this crate does not model (e.g. compound types).
    Unknown(u32),
}

impl ControlType {
    /// Map the kernel's `V4L2_CTRL_TYPE_*` value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Integer,
            2 => Self::Boolean,
            3 => Self::Menu,
            4 => Self::Button,
            5 => Self::Integer64,
            6 => Self::Class,
            7 => Self::String,
            8 => Self::Bitmask,
            9 => Self::IntegerMenu,
            other => Self::Unknown(other),
        }
    }

    /// Whether the control carries a menu.
    #[must_use]
    pub const fn has_menu(self) -> bool {
        matches!(self, Self::Menu | Self::IntegerMenu)
    }

    /// Short lowercase name, as printed by control listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Boolean => "bool",
            Self::Menu => "menu",
            Self::Button => "button",
            Self::Integer64 => "int64",
            Self::Class => "class",
            Self::String => "string",
            Self::Bitmask => "bitmask",
            Self::IntegerMenu => "int_menu",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Control flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ControlFlags {
    /// Control is permanently disabled.
    pub disabled: bool,
    /// Control is temporarily locked by another application.
    pub grabbed: bool,
    /// Value can only be read.
    pub read_only: bool,
    /// Changing it may change other controls.
    pub update: bool,
    /// Not applicable in the current configuration.
    pub inactive: bool,
    /// Best shown as a slider.
    pub slider: bool,
    /// Value can only be written.
    pub write_only: bool,
    /// Value changes on its own (e.g. auto gain).
    pub volatile: bool,
}

impl ControlFlags {
    const DISABLED: u32 = 0x0001;
    const GRABBED: u32 = 0x0002;
    const READ_ONLY: u32 = 0x0004;
    const UPDATE: u32 = 0x0008;
    const INACTIVE: u32 = 0x0010;
    const SLIDER: u32 = 0x0020;
    const WRITE_ONLY: u32 = 0x0040;
    const VOLATILE: u32 = 0x0080;

    /// Decode the kernel's `V4L2_CTRL_FLAG_*` bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            disabled: bits & Self::DISABLED != 0,
            grabbed: bits & Self::GRABBED != 0,
            read_only: bits & Self::READ_ONLY != 0,
            update: bits & Self::UPDATE != 0,
            inactive: bits & Self::INACTIVE != 0,
            slider: bits & Self::SLIDER != 0,
            write_only: bits & Self::WRITE_ONLY != 0,
            volatile: bits & Self::VOLATILE != 0,
        }
    }
}

/// Value of one menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Entry of a [`ControlType::Menu`] control.
    Name(String),
    /// Entry of a [`ControlType::IntegerMenu`] control.
    Value(i64),
}

/// A valid menu entry and the index the driver accepts for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Menu index (the control value selecting this entry).
    pub index: u32,
    /// Entry value.
    pub item: MenuItem,
}

/// Description of one device control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Control id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Value type.
    pub kind: ControlType,
    /// Minimum value.
    pub minimum: i32,
    /// Maximum value.
    pub maximum: i32,
    /// Value step.
    pub step: i32,
    /// Default value.
    pub default_value: i32,
    /// Flag set.
    pub flags: ControlFlags,
    /// Menu entries; empty unless `kind` is a menu type.
    pub menu: Vec<MenuEntry>,
}

/// Raw `VIDIOC_QUERYCTRL` result, before menu enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    /// Control id.
    pub id: u32,
    /// Raw `V4L2_CTRL_TYPE_*` value.
    pub kind: u32,
    /// Display name.
    pub name: String,
    /// Minimum value.
    pub minimum: i32,
    /// Maximum value.
    pub maximum: i32,
    /// Value step.
    pub step: i32,
    /// Default value.
    pub default_value: i32,
    /// Raw `V4L2_CTRL_FLAG_*` bits.
    pub flags: u32,
}

impl From<ControlInfo> for Control {
    fn from(info: ControlInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            kind: ControlType::from_raw(info.kind),
            minimum: info.minimum,
            maximum: info.maximum,
            step: info.step,
            default_value: info.default_value,
            flags: ControlFlags::from_bits(info.flags),
            menu: Vec::new(),
        }
    }
}
