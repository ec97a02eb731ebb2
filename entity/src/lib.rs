//! Densely numbered entity references as mapping keys.
//!
//! This crate defines a number of data structures that map densely numbered entities to
//! values. Instances of the same concept (basic blocks, instructions, values, virtual
//! registers, ...) are referenced by a small `u32`-wrapping key type instead of a raw
//! pointer, so the owning arena can be indexed with a `Vec` instead of a hash map.
#![no_std]

#[cfg(not(feature = "std"))]
extern crate alloc as std;
#[cfg(feature = "std")]
extern crate std;

/// A type wrapping a small integer index should implement `EntityRef` so it can be used
/// as the key of an `PrimaryMap` or `SecondaryMap`.
pub trait EntityRef: Copy + Eq {
    /// Create a new entity reference from a small integer.
    fn new(index: usize) -> Self;

    /// Get the index that was used to create this entity reference.
    fn index(self) -> usize;
}

/// Macro that generates a `u32`-based entity reference type implementing `EntityRef`,
/// `Display`, and `Debug` for the text format `<prefix><number>`.
#[macro_export]
macro_rules! entity_impl {
    ($entity:ident) => {
        impl $crate::EntityRef for $entity {
            #[inline]
            fn new(index: usize) -> Self {
                debug_assert!(index < (::core::u32::MAX as usize));
                $entity(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl $crate::packed_option::ReservedValue for $entity {
            fn reserved_value() -> $entity {
                $entity(::core::u32::MAX)
            }

            fn is_reserved_value(&self) -> bool {
                self.0 == ::core::u32::MAX
            }
        }

        impl Default for $entity {
            fn default() -> Self {
                $crate::packed_option::ReservedValue::reserved_value()
            }
        }
    };

    ($entity:ident, $display_prefix:expr) => {
        entity_impl!($entity);

        impl ::core::fmt::Display for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                write!(f, concat!($display_prefix, "{}"), self.0)
            }
        }

        impl ::core::fmt::Debug for $entity {
            fn fmt(&self, f: &mut ::core::fmt::Formatter) -> ::core::fmt::Result {
                (self as &dyn ::core::fmt::Display).fmt(f)
            }
        }
    };
}

pub mod iter;
pub mod keys;
pub mod map;
pub mod packed_option;
pub mod primary_map;
pub mod set;

pub use crate::map::SecondaryMap;
pub use crate::packed_option::PackedOption;
pub use crate::primary_map::PrimaryMap;
pub use crate::set::EntitySet;
