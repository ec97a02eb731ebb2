//! The `Runtime` capability: the class-linker/GC/runtime collaborator injected by the
//! embedder.
//!
//! Every pass that needs to ask "is this class instantiable", "what's the layout of this
//! field", or "what does this method's name print as" goes through this trait instead of
//! reaching into a concrete runtime. That keeps the optimizer testable with a fake runtime
//! and keeps the class-linker/GC/deopt machinery out of this crate, per the scope notes in
//! the specification.

use crate::ir::DataType;

/// Opaque handle to a field, minted and interpreted by the embedder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldPtr(pub u32);

/// Opaque handle to a class, minted and interpreted by the embedder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassPtr(pub u32);

/// Opaque handle to a method, minted and interpreted by the embedder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef(pub u32);

/// A runtime query failed (class not resolved, field lookup bounced, etc). Passes convert
/// this into [`crate::error::CoreError::RuntimeLookupFailure`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("runtime lookup failure: {0}")]
pub struct RuntimeLookupError(pub String);

/// Result type for fallible [`Runtime`] queries.
pub type RuntimeResult<T> = Result<T, RuntimeLookupError>;

/// External collaborator supplying class-linker/runtime facts to the optimizer.
///
/// All queries are expected to complete synchronously: the core never suspends, so an
/// implementation that needs to go off and, say, lazily resolve a class must do so before
/// returning.
pub trait Runtime {
    /// The declared type of a field.
    fn field_type(&self, field: FieldPtr) -> RuntimeResult<DataType>;

    /// A stable numeric id for a field, used to key `Field` map entries.
    fn field_id(&self, field: FieldPtr) -> RuntimeResult<u32>;

    /// Whether this field is declared `volatile`.
    fn is_field_volatile(&self, field: FieldPtr) -> RuntimeResult<bool>;

    /// The class that declares field number `field_id` as seen from `method`.
    fn class_id_for_field(&self, method: MethodRef, field_id: u32) -> RuntimeResult<u32>;

    /// The element type of an array class.
    fn array_component_type(&self, class: ClassPtr) -> RuntimeResult<DataType>;

    /// Whether `class` can be instantiated directly (not abstract/interface).
    fn is_instantiable(&self, class: ClassPtr) -> RuntimeResult<bool>;

    /// Whether objects of `class` are safe to scalar-replace (no finalizer, no identity
    /// hash captured elsewhere, etc -- policy lives entirely with the embedder).
    fn can_scalar_replace_object(&self, class: ClassPtr) -> RuntimeResult<bool>;

    /// Fully-qualified name of `method`, for diagnostics; `with_signature` appends the
    /// descriptor.
    fn method_full_name(&self, method: MethodRef, with_signature: bool) -> RuntimeResult<String>;
}

/// A [`Runtime`] useful for unit tests: every class is instantiable and scalar-replaceable,
/// fields round-trip through a simple table the test populates.
#[cfg(any(test, feature = "testing_hooks"))]
#[derive(Default)]
pub struct FakeRuntime {
    /// `field_id -> (type, volatile)` table that tests populate directly.
    pub fields: std::collections::HashMap<u32, (DataType, bool)>,
    /// Array component types, keyed by class id.
    pub array_components: std::collections::HashMap<u32, DataType>,
    /// Classes that should report `is_instantiable() == false`.
    pub not_instantiable: std::collections::HashSet<u32>,
    /// Classes that should report `can_scalar_replace_object() == false`.
    pub not_scalar_replaceable: std::collections::HashSet<u32>,
}

#[cfg(any(test, feature = "testing_hooks"))]
impl Runtime for FakeRuntime {
    fn field_type(&self, field: FieldPtr) -> RuntimeResult<DataType> {
        self.fields
            .get(&field.0)
            .map(|(ty, _)| *ty)
            .ok_or_else(|| RuntimeLookupError(format!("unknown field {:?}", field)))
    }

    fn field_id(&self, field: FieldPtr) -> RuntimeResult<u32> {
        Ok(field.0)
    }

    fn is_field_volatile(&self, field: FieldPtr) -> RuntimeResult<bool> {
        Ok(self.fields.get(&field.0).map(|(_, v)| *v).unwrap_or(false))
    }

    fn class_id_for_field(&self, _method: MethodRef, field_id: u32) -> RuntimeResult<u32> {
        Ok(field_id)
    }

    fn array_component_type(&self, class: ClassPtr) -> RuntimeResult<DataType> {
        self.array_components
            .get(&class.0)
            .copied()
            .ok_or_else(|| RuntimeLookupError(format!("unknown array class {:?}", class)))
    }

    fn is_instantiable(&self, class: ClassPtr) -> RuntimeResult<bool> {
        Ok(!self.not_instantiable.contains(&class.0))
    }

    fn can_scalar_replace_object(&self, class: ClassPtr) -> RuntimeResult<bool> {
        Ok(!self.not_scalar_replaceable.contains(&class.0))
    }

    fn method_full_name(&self, method: MethodRef, with_signature: bool) -> RuntimeResult<String> {
        if with_signature {
            Ok(format!("method#{}(...)", method.0))
        } else {
            Ok(format!("method#{}", method.0))
        }
    }
}
