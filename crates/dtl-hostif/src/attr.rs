//! Attribute surface exposed per board.
//!
//! Names match the per-board sysfs attribute files.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};
use crate::registry::BoardConfig;
use crate::regs::{REG_BOOTP, REG_DIPSW, REG_FFE, REG_FFF, REG_STAT};
use crate::transfer::Channel;

/// Access allowed on an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AttrMode {
    pub const fn readable(self) -> bool {
        matches!(self, AttrMode::ReadOnly | AttrMode::ReadWrite)
    }

    pub const fn writable(self) -> bool {
        matches!(self, AttrMode::WriteOnly | AttrMode::ReadWrite)
    }

    /// Unix permission bits used when exposing the attribute as a file.
    pub const fn permissions(self) -> u32 {
        match self {
            AttrMode::ReadOnly => 0o444,
            AttrMode::WriteOnly => 0o200,
            AttrMode::ReadWrite => 0o644,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Bootp,
    Stat,
    Dipsw,
    BufferA,
    BufferB,
    BufferSize,
    Ffe,
    Fff,
    Reset,
    /// Raw dump of the first buffer-size bytes of the window. Optional, see
    /// [`BoardConfig::zero_page`].
    ZeroPage,
}

impl Attribute {
    /// Every attribute, in registration order.
    pub const ALL: [Attribute; 10] = [
        Attribute::Bootp,
        Attribute::Stat,
        Attribute::Dipsw,
        Attribute::BufferA,
        Attribute::BufferB,
        Attribute::BufferSize,
        Attribute::Ffe,
        Attribute::Fff,
        Attribute::Reset,
        Attribute::ZeroPage,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Attribute::Bootp => "bootp",
            Attribute::Stat => "stat",
            Attribute::Dipsw => "dipsw",
            Attribute::BufferA => "eight",
            Attribute::BufferB => "cee",
            Attribute::BufferSize => "host_if_bufsize",
            Attribute::Ffe => "ffe",
            Attribute::Fff => "fff",
            Attribute::Reset => "preset",
            Attribute::ZeroPage => "zeropage",
        }
    }

    pub const fn mode(self) -> AttrMode {
        match self {
            Attribute::BufferSize | Attribute::ZeroPage => AttrMode::ReadOnly,
            Attribute::Reset => AttrMode::WriteOnly,
            _ => AttrMode::ReadWrite,
        }
    }

    /// Buffer channel backing this attribute, if any.
    pub const fn channel(self) -> Option<Channel> {
        match self {
            Attribute::BufferA => Some(Channel::A),
            Attribute::BufferB => Some(Channel::B),
            _ => None,
        }
    }

    /// Window offset of the byte register backing this attribute, if it is one.
    pub const fn register_offset(self) -> Option<usize> {
        match self {
            Attribute::Bootp => Some(REG_BOOTP),
            Attribute::Stat => Some(REG_STAT),
            Attribute::Dipsw => Some(REG_DIPSW),
            Attribute::Ffe => Some(REG_FFE),
            Attribute::Fff => Some(REG_FFF),
            _ => None,
        }
    }

    /// True for attributes whose contents are raw bytes rather than a decimal value.
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            Attribute::BufferA | Attribute::BufferB | Attribute::ZeroPage
        )
    }

    /// Attributes exposed for a board configured with `config`, in registration order.
    pub fn surface(config: &BoardConfig) -> Vec<Attribute> {
        Self::ALL
            .into_iter()
            .filter(|attr| *attr != Attribute::ZeroPage || config.zero_page)
            .collect()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.name() == s)
            .ok_or_else(|| Error::UnknownAttribute(s.to_string()))
    }
}

/// Parses a decimal unsigned integer written to a numeric attribute.
///
/// Surrounding ASCII whitespace (such as the newline `echo` appends) is ignored and a single
/// leading `+` is allowed. Anything else, including values that overflow `u32`, is rejected.
pub fn parse_decimal(attr: Attribute, input: &[u8]) -> Result<u32> {
    let invalid = |reason: &'static str| Error::InvalidValue {
        attr: attr.name(),
        reason,
    };

    let text = core::str::from_utf8(input).map_err(|_| invalid("not valid UTF-8"))?;
    let text = text.trim_matches(|c: char| c.is_ascii_whitespace());
    let digits = text.strip_prefix('+').unwrap_or(text);
    if digits.is_empty() {
        return Err(invalid("empty value"));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a decimal unsigned integer"));
    }
    digits.parse::<u32>().map_err(|_| invalid("value out of range"))
}

/// Parses a value for one of the byte-wide register attributes.
pub fn parse_register_value(attr: Attribute, input: &[u8]) -> Result<u8> {
    let value = parse_decimal(attr, input)?;
    u8::try_from(value).map_err(|_| Error::InvalidValue {
        attr: attr.name(),
        reason: "value exceeds 255",
    })
}

/// Parses a write to the reset trigger, which only accepts the literal `1`.
pub fn parse_reset_trigger(input: &[u8]) -> Result<()> {
    match parse_decimal(Attribute::Reset, input)? {
        1 => Ok(()),
        _ => Err(Error::InvalidValue {
            attr: Attribute::Reset.name(),
            reason: "reset trigger only accepts 1",
        }),
    }
}
