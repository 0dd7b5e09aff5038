//! Readout channel and wire identifiers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tracker technology a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Subdetector {
    /// Drift chamber with sense wires.
    Drift,
    /// Straw-tube tracker.
    Stt,
}

impl fmt::Display for Subdetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift => write!(f, "DRIFT"),
            Self::Stt => write!(f, "STT"),
        }
    }
}

/// Identifier of a readout channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelId {
    /// Subdetector the channel reads out.
    pub subdetector: Subdetector,
    /// DAQ link (one per station).
    pub link: u16,
    /// Channel number on the link.
    pub channel: u32,
}

impl ChannelId {
    /// Creates a channel id.
    #[inline]
    pub fn new(subdetector: Subdetector, link: u16, channel: u32) -> Self {
        Self {
            subdetector,
            link,
            channel,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.subdetector, self.link, self.channel)
    }
}

/// Dense index of a wire inside a geometry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WireId(pub u32);

impl WireId {
    /// Returns the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}
