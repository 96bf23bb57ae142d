//! Stretcher option bits and the user-facing [`TimeStretchOptions`].

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::FxError;

/// Option bitfield passed to a [`crate::stretch::Stretcher`] at construction.
///
/// Groups of bits are mutually exclusive; each group has a zero-valued
/// default member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StretcherOptions(u32);

impl StretcherOptions {
    pub const PROCESS_OFFLINE: Self = Self(0x0);
    pub const PROCESS_REALTIME: Self = Self(0x1);

    pub const STRETCH_ELASTIC: Self = Self(0x0);
    pub const STRETCH_PRECISE: Self = Self(0x10);

    pub const TRANSIENTS_CRISP: Self = Self(0x0);
    pub const TRANSIENTS_MIXED: Self = Self(0x100);
    pub const TRANSIENTS_SMOOTH: Self = Self(0x200);

    pub const DETECTOR_COMPOUND: Self = Self(0x0);
    pub const DETECTOR_PERCUSSIVE: Self = Self(0x400);
    pub const DETECTOR_SOFT: Self = Self(0x800);

    pub const PHASE_LAMINAR: Self = Self(0x0);
    pub const PHASE_INDEPENDENT: Self = Self(0x2000);

    pub const THREADING_NEVER: Self = Self(0x10000);

    pub const WINDOW_STANDARD: Self = Self(0x0);
    pub const WINDOW_SHORT: Self = Self(0x10_0000);
    pub const WINDOW_LONG: Self = Self(0x20_0000);

    pub const SMOOTHING_OFF: Self = Self(0x0);
    pub const SMOOTHING_ON: Self = Self(0x80_0000);

    pub const FORMANT_SHIFTED: Self = Self(0x0);
    pub const FORMANT_PRESERVED: Self = Self(0x100_0000);

    pub const PITCH_HIGH_QUALITY: Self = Self(0x200_0000);

    pub const CHANNELS_TOGETHER: Self = Self(0x1000_0000);

    pub const ENGINE_FASTER: Self = Self(0x0);
    pub const ENGINE_FINER: Self = Self(0x2000_0000);

    const TRANSIENTS_MASK: u32 = 0x300;
    const DETECTOR_MASK: u32 = 0xC00;
    const WINDOW_MASK: u32 = 0x30_0000;

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True when every bit of `other` is set. Zero-valued members are
    /// always contained; query their group through the typed accessors.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_realtime(self) -> bool {
        self.contains(Self::PROCESS_REALTIME)
    }

    pub fn transient_mode(self) -> TransientMode {
        match self.0 & Self::TRANSIENTS_MASK {
            0x100 => TransientMode::Mixed,
            0x200 => TransientMode::Smooth,
            _ => TransientMode::Crisp,
        }
    }

    pub fn transient_detector(self) -> TransientDetector {
        match self.0 & Self::DETECTOR_MASK {
            0x400 => TransientDetector::Percussive,
            0x800 => TransientDetector::Soft,
            _ => TransientDetector::Compound,
        }
    }

    pub fn window(self) -> WindowSize {
        match self.0 & Self::WINDOW_MASK {
            0x10_0000 => WindowSize::Short,
            0x20_0000 => WindowSize::Long,
            _ => WindowSize::Standard,
        }
    }
}

impl BitOr for StretcherOptions {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StretcherOptions {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// FFT window length class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSize {
    Short,
    Standard,
    Long,
}

/// What the stretcher does to component phases at a detected transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransientMode {
    /// Reset every bin's phase at a transient.
    #[default]
    Crisp,
    /// Reset only bins outside the band of typical musical fundamentals.
    Mixed,
    /// Never reset; transients smear but tones stay continuous.
    Smooth,
}

impl TransientMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransientMode::Crisp => "crisp",
            TransientMode::Mixed => "mixed",
            TransientMode::Smooth => "smooth",
        }
    }

    fn bits(self) -> StretcherOptions {
        match self {
            TransientMode::Crisp => StretcherOptions::TRANSIENTS_CRISP,
            TransientMode::Mixed => StretcherOptions::TRANSIENTS_MIXED,
            TransientMode::Smooth => StretcherOptions::TRANSIENTS_SMOOTH,
        }
    }
}

impl fmt::Display for TransientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransientMode {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crisp" => Ok(TransientMode::Crisp),
            "mixed" => Ok(TransientMode::Mixed),
            "smooth" => Ok(TransientMode::Smooth),
            other => Err(FxError::bad_parameter(format!(
                "transient mode must be one of crisp, mixed, smooth; got {other:?}"
            ))),
        }
    }
}

/// Onset detector family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TransientDetector {
    /// Percussive or soft, whichever fires.
    #[default]
    Compound,
    /// Broadband energy rise; suited to drums.
    Percussive,
    /// Band-weighted spectral flux; suited to softer onsets.
    Soft,
}

impl TransientDetector {
    pub fn as_str(self) -> &'static str {
        match self {
            TransientDetector::Compound => "compound",
            TransientDetector::Percussive => "percussive",
            TransientDetector::Soft => "soft",
        }
    }

    fn bits(self) -> StretcherOptions {
        match self {
            TransientDetector::Compound => StretcherOptions::DETECTOR_COMPOUND,
            TransientDetector::Percussive => StretcherOptions::DETECTOR_PERCUSSIVE,
            TransientDetector::Soft => StretcherOptions::DETECTOR_SOFT,
        }
    }
}

impl fmt::Display for TransientDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransientDetector {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compound" => Ok(TransientDetector::Compound),
            "percussive" => Ok(TransientDetector::Percussive),
            "soft" => Ok(TransientDetector::Soft),
            other => Err(FxError::bad_parameter(format!(
                "transient detector must be one of compound, percussive, soft; got {other:?}"
            ))),
        }
    }
}

/// Quality and character settings for [`crate::time_stretch`].
///
/// # Example
///
/// ```
/// use fxchain::{TimeStretchOptions, TransientMode};
///
/// let opts = TimeStretchOptions::default()
///     .with_transient_mode(TransientMode::Smooth)
///     .with_long_fft_window(Some(true));
/// assert!(opts.high_quality);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeStretchOptions {
    /// Finer engine (more overlap) instead of the faster one.
    pub high_quality: bool,
    pub transient_mode: TransientMode,
    pub transient_detector: TransientDetector,
    /// Lock non-peak phases to their spectral peak (laminar) instead of
    /// evolving each bin independently.
    pub retain_phase_continuity: bool,
    /// `Some(true)` long window, `Some(false)` short window, `None` standard.
    pub use_long_fft_window: Option<bool>,
    pub use_time_domain_smoothing: bool,
    pub preserve_formants: bool,
}

impl Default for TimeStretchOptions {
    fn default() -> Self {
        Self {
            high_quality: true,
            transient_mode: TransientMode::Crisp,
            transient_detector: TransientDetector::Compound,
            retain_phase_continuity: true,
            use_long_fft_window: None,
            use_time_domain_smoothing: false,
            preserve_formants: true,
        }
    }
}

impl TimeStretchOptions {
    pub fn with_high_quality(mut self, high_quality: bool) -> Self {
        self.high_quality = high_quality;
        self
    }

    pub fn with_transient_mode(mut self, mode: TransientMode) -> Self {
        self.transient_mode = mode;
        self
    }

    pub fn with_transient_detector(mut self, detector: TransientDetector) -> Self {
        self.transient_detector = detector;
        self
    }

    pub fn with_phase_continuity(mut self, retain: bool) -> Self {
        self.retain_phase_continuity = retain;
        self
    }

    pub fn with_long_fft_window(mut self, long: Option<bool>) -> Self {
        self.use_long_fft_window = long;
        self
    }

    pub fn with_time_domain_smoothing(mut self, on: bool) -> Self {
        self.use_time_domain_smoothing = on;
        self
    }

    pub fn with_formant_preservation(mut self, on: bool) -> Self {
        self.preserve_formants = on;
        self
    }

    /// Bits for these settings, without the processing-mode bit.
    pub fn stretcher_options(&self) -> StretcherOptions {
        let mut opts = self.transient_mode.bits() | self.transient_detector.bits();
        if self.high_quality {
            opts |= StretcherOptions::ENGINE_FINER;
        }
        if !self.retain_phase_continuity {
            opts |= StretcherOptions::PHASE_INDEPENDENT;
        }
        match self.use_long_fft_window {
            Some(true) => opts |= StretcherOptions::WINDOW_LONG,
            Some(false) => opts |= StretcherOptions::WINDOW_SHORT,
            None => {}
        }
        if self.use_time_domain_smoothing {
            opts |= StretcherOptions::SMOOTHING_ON;
        }
        if self.preserve_formants {
            opts |= StretcherOptions::FORMANT_PRESERVED;
        }
        opts
    }
}
