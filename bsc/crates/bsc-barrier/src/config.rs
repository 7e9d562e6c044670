//! Configuration Module - Barrier Compilation Options
//!
//! Resolved once per compiler instance. Identical configurations produce identical
//! code for identical graphs.

use bsc_lir::CompressEncoding;
use serde::{Deserialize, Serialize};

/// Collector flavor the compiled code runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectorKind {
    /// No barriers at all
    Epsilon,
    /// Region-based concurrent SATB collector
    Satb,
    /// SATB collector with generations; requires card-marking post barriers
    GenerationalSatb,
}

impl std::str::FromStr for CollectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epsilon" => Ok(CollectorKind::Epsilon),
            "satb" => Ok(CollectorKind::Satb),
            "generational" | "generational-satb" => Ok(CollectorKind::GenerationalSatb),
            other => Err(ConfigError::InvalidValue {
                key: "collector",
                value: other.to_string(),
            }),
        }
    }
}

/// How the load-reference barrier is lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LrbLowering {
    /// Inline LIR fragment
    Snippet,
    /// Platform-specific fast path expanded by the emitter
    Assembly,
}

/// Barrier compilation options
///
/// # Examples
///
/// ```rust
/// use bsc_barrier::{BarrierConfig, CollectorKind};
///
/// let config = BarrierConfig {
///     collector: CollectorKind::GenerationalSatb,
///     post_write_barriers: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierConfig {
    /// Collector flavor
    ///
    /// Default: `Satb`
    pub collector: CollectorKind,

    /// Emit SATB pre-write and keep-alive barriers
    ///
    /// Default: true
    pub satb_barriers: bool,

    /// Barrier compare-and-swap on references
    ///
    /// When false and the collector needs write barriers, a reference CAS is a
    /// compilation error.
    ///
    /// Default: true
    pub cas_barriers: bool,

    /// Card-marking post-write barriers
    ///
    /// Default: false
    pub post_write_barriers: bool,

    /// Load-reference barriers on reference reads
    ///
    /// Default: true
    pub load_reference_barriers: bool,

    /// References may be stored in compressed form
    ///
    /// Default: false
    pub narrow_pointers: bool,

    /// Encoding for compressed references; required with `narrow_pointers`
    ///
    /// Default: None
    pub compress_encoding: Option<CompressEncoding>,

    /// Call the pointer verifier on values flowing through barriers
    ///
    /// Default: false
    pub verify_oops: bool,

    /// Attempted/effective/executed counters in barrier fragments
    ///
    /// Default: false
    pub snippet_counters: bool,

    /// Emit trace records once the collection count exceeds this value; 0 disables
    ///
    /// Default: 0
    pub trace_start_cycle: u32,

    /// Load-reference barrier lowering strategy
    ///
    /// Default: `Snippet`
    pub lrb_lowering: LrbLowering,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        BarrierConfig {
            collector: CollectorKind::Satb,
            satb_barriers: true,
            cas_barriers: true,
            post_write_barriers: false,
            load_reference_barriers: true,
            narrow_pointers: false,
            compress_encoding: None,
            verify_oops: false,
            snippet_counters: false,
            trace_start_cycle: 0,
            lrb_lowering: LrbLowering::Snippet,
        }
    }
}

impl BarrierConfig {
    /// Configuration for a collector that needs no barriers
    pub fn epsilon() -> Self {
        BarrierConfig {
            collector: CollectorKind::Epsilon,
            satb_barriers: false,
            post_write_barriers: false,
            load_reference_barriers: false,
            ..Default::default()
        }
    }

    /// Validate configuration
    ///
    /// Checks flag combinations that cannot produce working code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.narrow_pointers && self.compress_encoding.is_none() {
            return Err(ConfigError::MissingEncoding);
        }

        if let Some(encoding) = self.compress_encoding {
            if encoding.shift > 3 {
                return Err(ConfigError::InvalidValue {
                    key: "compress_encoding.shift",
                    value: encoding.shift.to_string(),
                });
            }
        }

        if self.collector == CollectorKind::GenerationalSatb && !self.post_write_barriers {
            return Err(ConfigError::GenerationalWithoutPostBarriers);
        }

        Ok(())
    }

    /// Whether diagnostic tracing is compiled in
    pub fn tracing_enabled(&self) -> bool {
        self.trace_start_cycle > 0
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - BSC_COLLECTOR (`epsilon`, `satb`, `generational`)
    /// - BSC_SATB
    /// - BSC_CAS_BARRIERS
    /// - BSC_POST_BARRIERS
    /// - BSC_LRB
    /// - BSC_NARROW_POINTERS (`base:shift`, or a boolean when the base is zero)
    /// - BSC_VERIFY_OOPS
    /// - BSC_SNIPPET_COUNTERS
    /// - BSC_TRACE_START_CYCLE
    /// - BSC_LRB_LOWERING (`snippet`, `assembly`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("BSC_COLLECTOR") {
            match val.parse::<CollectorKind>() {
                Ok(kind) => config.collector = kind,
                Err(e) => log::warn!("ignoring BSC_COLLECTOR: {}", e),
            }
        }

        let flag = |key: &str, target: &mut bool| {
            if let Some(val) = lookup(key) {
                *target = parse_flag(&val);
            }
        };
        flag("BSC_SATB", &mut config.satb_barriers);
        flag("BSC_CAS_BARRIERS", &mut config.cas_barriers);
        flag("BSC_POST_BARRIERS", &mut config.post_write_barriers);
        flag("BSC_LRB", &mut config.load_reference_barriers);
        flag("BSC_VERIFY_OOPS", &mut config.verify_oops);
        flag("BSC_SNIPPET_COUNTERS", &mut config.snippet_counters);

        if let Some(val) = lookup("BSC_NARROW_POINTERS") {
            match parse_encoding(&val) {
                Some(encoding) => {
                    config.narrow_pointers = true;
                    config.compress_encoding = Some(encoding);
                }
                None => {
                    config.narrow_pointers = parse_flag(&val);
                    if config.narrow_pointers {
                        config.compress_encoding = Some(CompressEncoding::new(0, 3));
                    }
                }
            }
        }

        if let Some(val) = lookup("BSC_TRACE_START_CYCLE") {
            match val.parse::<u32>() {
                Ok(cycle) => config.trace_start_cycle = cycle,
                Err(_) => log::warn!("ignoring BSC_TRACE_START_CYCLE={}", val),
            }
        }

        if let Some(val) = lookup("BSC_LRB_LOWERING") {
            match val.to_ascii_lowercase().as_str() {
                "snippet" => config.lrb_lowering = LrbLowering::Snippet,
                "assembly" | "asm" => config.lrb_lowering = LrbLowering::Assembly,
                _ => log::warn!("ignoring BSC_LRB_LOWERING={}", val),
            }
        }

        config
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true") || val.eq_ignore_ascii_case("on")
}

fn parse_encoding(val: &str) -> Option<CompressEncoding> {
    let (base, shift) = val.split_once(':')?;
    let base = match base.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => base.parse().ok()?,
    };
    Some(CompressEncoding::new(base, shift.parse().ok()?))
}

/// Error types for configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("narrow pointers enabled without a compress encoding")]
    MissingEncoding,

    #[error("post-write barriers enabled but the layout has no card table")]
    MissingCardTable,

    #[error("generational collector requires post-write barriers")]
    GenerationalWithoutPostBarriers,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
