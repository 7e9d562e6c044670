//! Barrier Policy - Access Classification
//!
//! Pure mapping from `(access class, target metadata, init kind)` to a
//! [`BarrierType`], and from a classification to the [`InsertionRule`] the inserter
//! applies. The policy is a small value type built once from the configuration.
//!
//! Write classification is fully explicit: every combination either maps to a
//! barrier type or fails loudly. Nothing falls through to `None` by default.

use bsc_ir::{AccessClass, BarrierType, InitKind, LocationKind, ReferentAccess, TargetMetadata, ValueKind};

use crate::config::{BarrierConfig, CollectorKind};
use crate::error::{BarrierError, Result};

/// What the inserter does for one classified access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionRule {
    /// Load-reference barrier after the read
    LoadReference,
    /// Load-reference barrier, then a keep-alive on the result
    LoadReferenceThenKeepAlive,
    /// Load-reference barrier, then a keep-alive guarded by a runtime referent check
    LoadReferenceThenDynamicKeepAlive,
    /// Pre-write loading the previous value, post-write after
    PreAndPost,
    /// Pre-write using the caller's expected value, post-write after
    ExpectedPreAndPost,
    /// Pre-write, post-write, and a load-reference barrier on the returned old value
    SwapPreAndPost,
    /// Post-write only
    PostOnly,
    /// One range pre-write before and one range post-write after
    RangePreAndPost,
}

/// Classification policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierPolicy {
    pub satb: bool,
    pub post_write: bool,
    pub load_reference: bool,
    pub cas: bool,
}

impl BarrierPolicy {
    pub fn from_config(config: &BarrierConfig) -> Self {
        match config.collector {
            CollectorKind::Epsilon => BarrierPolicy {
                satb: false,
                post_write: false,
                load_reference: false,
                cas: config.cas_barriers,
            },
            CollectorKind::Satb | CollectorKind::GenerationalSatb => BarrierPolicy {
                satb: config.satb_barriers,
                post_write: config.post_write_barriers,
                load_reference: config.load_reference_barriers,
                cas: config.cas_barriers,
            },
        }
    }

    fn needs_write_barriers(&self) -> bool {
        self.satb || self.post_write
    }

    /// Classify one access
    pub fn classify(&self, class: AccessClass, target: &TargetMetadata, init: InitKind) -> Result<BarrierType> {
        if let ValueKind::Primitive(_) = target.value {
            return Ok(BarrierType::None);
        }
        if target.location == LocationKind::OffHeap {
            return Err(BarrierError::OffHeapReference { class });
        }

        match class {
            AccessClass::Read => Ok(self.classify_read(target.location)),
            AccessClass::Write => Ok(self.classify_write(target, init)),
            AccessClass::AtomicReadWrite => {
                // The returned old value is a reference load as well
                if !self.needs_write_barriers() && !self.load_reference {
                    return Ok(BarrierType::None);
                }
                Ok(write_type(target, init, self.post_write))
            }
            AccessClass::CompareAndSwap => {
                if !self.needs_write_barriers() {
                    return Ok(BarrierType::None);
                }
                if !self.cas {
                    return Err(BarrierError::UnsupportedAccess {
                        class,
                        location: target.location,
                    });
                }
                Ok(self.classify_write(target, init))
            }
            AccessClass::ArrayRangeWrite => {
                if !self.needs_write_barriers() || init.is_initializing() {
                    return Ok(BarrierType::None);
                }
                Ok(BarrierType::Array)
            }
        }
    }

    fn classify_read(&self, location: LocationKind) -> BarrierType {
        let barrier_type = match location {
            LocationKind::Field => BarrierType::Field,
            LocationKind::ArrayElement => BarrierType::Array,
            LocationKind::Unknown => BarrierType::Unknown,
            LocationKind::Referent(ReferentAccess::Get) => BarrierType::ReferenceGet,
            LocationKind::Referent(ReferentAccess::RefersTo) => BarrierType::WeakRefersTo,
            LocationKind::Referent(ReferentAccess::PhantomRefersTo) => BarrierType::PhantomRefersTo,
            LocationKind::OffHeap => BarrierType::None,
        };
        if self.load_reference {
            return barrier_type;
        }
        // Without load barriers only the Reference.get keep-alive remains
        match barrier_type {
            BarrierType::ReferenceGet if self.satb => barrier_type,
            _ => BarrierType::None,
        }
    }

    fn classify_write(&self, target: &TargetMetadata, init: InitKind) -> BarrierType {
        if !self.needs_write_barriers() {
            return BarrierType::None;
        }
        write_type(target, init, self.post_write)
    }

    /// Insertion rule for a non-`None` classification
    pub fn insertion_rule(&self, class: AccessClass, barrier_type: BarrierType) -> Result<InsertionRule> {
        use BarrierType as T;
        let rule = match (class, barrier_type) {
            (AccessClass::Read, T::Field | T::Array | T::WeakRefersTo | T::PhantomRefersTo) => {
                InsertionRule::LoadReference
            }
            (AccessClass::Read, T::ReferenceGet) => InsertionRule::LoadReferenceThenKeepAlive,
            (AccessClass::Read, T::Unknown) => InsertionRule::LoadReferenceThenDynamicKeepAlive,

            (AccessClass::Write, T::Field | T::Array | T::Unknown) => InsertionRule::PreAndPost,
            (AccessClass::CompareAndSwap, T::Field | T::Array | T::Unknown) => {
                InsertionRule::ExpectedPreAndPost
            }
            (AccessClass::AtomicReadWrite, T::Field | T::Array | T::Unknown) => {
                InsertionRule::SwapPreAndPost
            }
            (
                AccessClass::Write | AccessClass::CompareAndSwap | AccessClass::AtomicReadWrite,
                T::PostInitWrite | T::AsNoKeepaliveWrite,
            ) => InsertionRule::PostOnly,

            (AccessClass::ArrayRangeWrite, T::Array) => InsertionRule::RangePreAndPost,

            _ => {
                return Err(BarrierError::UnmappedClassification {
                    class,
                    barrier_type,
                })
            }
        };
        Ok(rule)
    }
}

fn write_type(target: &TargetMetadata, init: InitKind, post_write: bool) -> BarrierType {
    match init {
        InitKind::Init => return BarrierType::None,
        InitKind::PostAllocationInit if post_write => return BarrierType::PostInitWrite,
        InitKind::PostAllocationInit => return BarrierType::None,
        InitKind::None => {}
    }
    if target.no_keepalive {
        return BarrierType::AsNoKeepaliveWrite;
    }
    match target.location {
        // A referent store overwrites a strong slot like any other field
        LocationKind::Field | LocationKind::Referent(_) => BarrierType::Field,
        LocationKind::ArrayElement => BarrierType::Array,
        LocationKind::Unknown => BarrierType::Unknown,
        // Rejected before classification
        LocationKind::OffHeap => BarrierType::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsc_ir::PrimitiveKind;

    fn satb() -> BarrierPolicy {
        BarrierPolicy::from_config(&BarrierConfig::default())
    }

    fn generational() -> BarrierPolicy {
        BarrierPolicy::from_config(&BarrierConfig {
            collector: CollectorKind::GenerationalSatb,
            post_write_barriers: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_primitive_never_barriered() {
        let target = TargetMetadata::primitive(PrimitiveKind::Int, LocationKind::Field);
        for class in [
            AccessClass::Read,
            AccessClass::Write,
            AccessClass::AtomicReadWrite,
            AccessClass::CompareAndSwap,
            AccessClass::ArrayRangeWrite,
        ] {
            assert_eq!(
                satb().classify(class, &target, InitKind::None).unwrap(),
                BarrierType::None
            );
        }
    }

    #[test]
    fn test_read_classification() {
        let p = satb();
        let read = |t: TargetMetadata| p.classify(AccessClass::Read, &t, InitKind::None).unwrap();

        assert_eq!(read(TargetMetadata::reference_field()), BarrierType::Field);
        assert_eq!(read(TargetMetadata::reference_array_element()), BarrierType::Array);
        assert_eq!(read(TargetMetadata::unknown_reference()), BarrierType::Unknown);
        assert_eq!(read(TargetMetadata::referent(ReferentAccess::Get)), BarrierType::ReferenceGet);
        assert_eq!(
            read(TargetMetadata::referent(ReferentAccess::RefersTo)),
            BarrierType::WeakRefersTo
        );
        assert_eq!(
            read(TargetMetadata::referent(ReferentAccess::PhantomRefersTo)),
            BarrierType::PhantomRefersTo
        );
    }

    #[test]
    fn test_reads_without_lrb_keep_only_keep_alive() {
        let p = BarrierPolicy {
            load_reference: false,
            ..satb()
        };
        let read = |t: TargetMetadata| p.classify(AccessClass::Read, &t, InitKind::None).unwrap();

        assert_eq!(read(TargetMetadata::reference_field()), BarrierType::None);
        assert_eq!(read(TargetMetadata::unknown_reference()), BarrierType::None);
        assert_eq!(read(TargetMetadata::referent(ReferentAccess::Get)), BarrierType::ReferenceGet);
        assert_eq!(
            read(TargetMetadata::referent(ReferentAccess::RefersTo)),
            BarrierType::None
        );
    }

    #[test]
    fn test_write_classification_is_explicit() {
        let p = satb();
        let write = |t: TargetMetadata, init| p.classify(AccessClass::Write, &t, init).unwrap();

        assert_eq!(write(TargetMetadata::reference_field(), InitKind::None), BarrierType::Field);
        assert_eq!(
            write(TargetMetadata::reference_array_element(), InitKind::None),
            BarrierType::Array
        );
        assert_eq!(write(TargetMetadata::unknown_reference(), InitKind::None), BarrierType::Unknown);
        assert_eq!(
            write(TargetMetadata::referent(ReferentAccess::Get), InitKind::None),
            BarrierType::Field
        );
        assert_eq!(
            write(TargetMetadata::referent(ReferentAccess::Get).as_no_keepalive(), InitKind::None),
            BarrierType::AsNoKeepaliveWrite
        );
        assert_eq!(
            write(TargetMetadata::reference_field().as_no_keepalive(), InitKind::None),
            BarrierType::AsNoKeepaliveWrite
        );
        // Initializing stores stay unbarriered even when flagged
        assert_eq!(
            write(TargetMetadata::reference_field().as_no_keepalive(), InitKind::Init),
            BarrierType::None
        );
        assert_eq!(write(TargetMetadata::reference_field(), InitKind::Init), BarrierType::None);
        // No post barriers: a late initializing store needs nothing
        assert_eq!(
            write(TargetMetadata::reference_field(), InitKind::PostAllocationInit),
            BarrierType::None
        );
    }

    #[test]
    fn test_post_allocation_init_with_card_marking() {
        let t = generational()
            .classify(
                AccessClass::Write,
                &TargetMetadata::reference_field(),
                InitKind::PostAllocationInit,
            )
            .unwrap();
        assert_eq!(t, BarrierType::PostInitWrite);
    }

    #[test]
    fn test_off_heap_reference_is_error() {
        let target = TargetMetadata::reference(LocationKind::OffHeap, false);
        let err = satb()
            .classify(AccessClass::Read, &target, InitKind::None)
            .unwrap_err();
        assert!(matches!(err, BarrierError::OffHeapReference { .. }));
        assert!(!err.is_bug());
    }

    #[test]
    fn test_cas_disabled_fails_loudly() {
        let p = BarrierPolicy { cas: false, ..satb() };
        let err = p
            .classify(
                AccessClass::CompareAndSwap,
                &TargetMetadata::reference_field(),
                InitKind::None,
            )
            .unwrap_err();
        assert!(matches!(err, BarrierError::UnsupportedAccess { .. }));

        // Without any write barrier there is nothing to support
        let epsilon = BarrierPolicy::from_config(&BarrierConfig {
            cas_barriers: false,
            ..BarrierConfig::epsilon()
        });
        let t = epsilon
            .classify(
                AccessClass::CompareAndSwap,
                &TargetMetadata::reference_field(),
                InitKind::None,
            )
            .unwrap();
        assert_eq!(t, BarrierType::None);
    }

    #[test]
    fn test_array_range_classification() {
        let p = satb();
        let refs = TargetMetadata::reference_array_element();
        assert_eq!(
            p.classify(AccessClass::ArrayRangeWrite, &refs, InitKind::None).unwrap(),
            BarrierType::Array
        );
        assert_eq!(
            p.classify(AccessClass::ArrayRangeWrite, &refs, InitKind::Init).unwrap(),
            BarrierType::None
        );
    }

    #[test]
    fn test_epsilon_classifies_everything_none() {
        let p = BarrierPolicy::from_config(&BarrierConfig::epsilon());
        let t = TargetMetadata::reference_field();
        assert_eq!(p.classify(AccessClass::Read, &t, InitKind::None).unwrap(), BarrierType::None);
        assert_eq!(p.classify(AccessClass::Write, &t, InitKind::None).unwrap(), BarrierType::None);
        assert_eq!(
            p.classify(AccessClass::AtomicReadWrite, &t, InitKind::None).unwrap(),
            BarrierType::None
        );
    }

    #[test]
    fn test_unmapped_pairs_are_internal_errors() {
        let p = satb();
        let err = p
            .insertion_rule(AccessClass::Read, BarrierType::PostInitWrite)
            .unwrap_err();
        assert!(err.is_bug());
        assert!(p
            .insertion_rule(AccessClass::ArrayRangeWrite, BarrierType::Field)
            .is_err());
        assert!(p.insertion_rule(AccessClass::Write, BarrierType::None).is_err());
    }
}
