//! Digitized signals and the per-event arena that owns them.

use crate::channel::{ChannelId, WireId};
use crate::hit::TruthLink;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time window in which a signal may have been produced.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeRange {
    /// Earliest plausible production time.
    pub earliest: f64,
    /// Nominal arrival time.
    pub nominal: f64,
    /// Latest plausible arrival time.
    pub latest: f64,
}

impl TimeRange {
    /// Returns true if `t` lies inside the window.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.earliest && t <= self.latest
    }
}

/// True composition of a signal's arrival time.
///
/// `hit_time + drift_time + propagation_time` is the noiseless arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalTiming {
    /// Time of the deposit at its closest approach to the wire.
    pub hit_time: f64,
    /// Ionization drift time to the wire.
    pub drift_time: f64,
    /// Propagation time along the wire to the readout end.
    pub propagation_time: f64,
}

impl SignalTiming {
    /// Noiseless arrival time at the readout.
    #[inline]
    pub fn arrival(&self) -> f64 {
        self.hit_time + self.drift_time + self.propagation_time
    }
}

/// A signal recorded by a tracker channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Signal {
    /// Readout channel.
    pub channel: ChannelId,
    /// Wire behind the channel.
    pub wire: WireId,
    /// Time-to-digital converter value (ns).
    pub tdc: f64,
    /// Analog-to-digital converter value (calibrated charge).
    pub adc: f64,
    /// Production window.
    pub time_range: TimeRange,
    /// Truth timing of the representative deposit.
    pub timing: SignalTiming,
    /// Truth hits feeding the signal.
    pub truth: TruthLink,
}

/// Stable handle of a signal inside a [`SignalArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SignalId(pub u32);

impl SignalId {
    /// Returns the index as `usize`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-event owner of all signals.
///
/// Signals are never mutated once pushed; downstream records refer to them
/// through [`SignalId`] handles.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalArena {
    signals: Vec<Signal>,
}

impl SignalArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an arena with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            signals: Vec::with_capacity(capacity),
        }
    }

    /// Stores a signal and returns its handle.
    pub fn push(&mut self, signal: Signal) -> SignalId {
        let id = SignalId(u32::try_from(self.signals.len()).unwrap_or(u32::MAX));
        self.signals.push(signal);
        id
    }

    /// Returns the signal behind `id`, if any.
    pub fn get(&self, id: SignalId) -> Option<&Signal> {
        self.signals.get(id.index())
    }

    /// Returns the signal read out by `channel`, if any.
    pub fn find_channel(&self, channel: ChannelId) -> Option<SignalId> {
        self.iter()
            .find(|(_, s)| s.channel == channel)
            .map(|(id, _)| id)
    }

    /// Number of signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Returns true if the arena holds no signal.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Iterates over `(handle, signal)` pairs in insertion order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .map(|(i, s)| (SignalId(i as u32), s))
    }

    /// All handles in insertion order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn ids(&self) -> impl Iterator<Item = SignalId> + '_ {
        (0..self.signals.len()).map(|i| SignalId(i as u32))
    }

    /// Signals as a slice.
    pub fn as_slice(&self) -> &[Signal] {
        &self.signals
    }
}

impl std::ops::Index<SignalId> for SignalArena {
    type Output = Signal;

    fn index(&self, id: SignalId) -> &Signal {
        &self.signals[id.index()]
    }
}
