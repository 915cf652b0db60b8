//! Class hierarchy casts
//!
//! Managed classes form a single-rooted hierarchy by composition: a derived
//! class embeds its base as the first field of a `#[repr(C)]` struct and
//! asserts the relationship with the unsafe [`Extends`] marker. Upcasts are
//! then plain pointer reinterpretation (the base is a layout prefix of the
//! derived class), and downcasts walk the super chain recorded in the type
//! registry, which only ever contains pairs vetted by `Extends`.

use crate::object::managed::{ManagedClass, RawObject};
use crate::reflect::hash::TypeKey;

/// Marker asserting that `Self` embeds `B` as its layout prefix.
///
/// # Safety
/// Implementors must guarantee that `Self` is `#[repr(C)]` and that its
/// first field is of type `B` (or itself starts with `B`, transitively).
/// A pointer to `Self`'s payload must be readable as a pointer to `B`.
///
/// `#[derive(Reflect)]` with an `extends` attribute emits this impl after
/// validating both conditions; hand-written impls carry the obligation
/// themselves.
pub unsafe trait Extends<B: ManagedClass>: ManagedClass {}

// Every class trivially extends itself.
unsafe impl<T: ManagedClass> Extends<T> for T {}

/// Whether the concrete class of `raw` is `target` or derives from it in
/// the registered hierarchy.
///
/// Falls back to exact key equality when the owning heap is gone (no
/// registry left to consult).
pub(crate) fn runtime_derives(raw: RawObject, target: TypeKey) -> bool {
    if raw.key() == target {
        return true;
    }
    // Safety: callers hold a live reference to the object
    let heap = match unsafe { raw.header().heap() } {
        Some(heap) => heap,
        None => return false,
    };
    heap.types().derives(raw.key(), target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ObjectHeap;
    use crate::object::strong::ObjectRef;
    use crate::reflect::builder::TypeBuilder;

    #[derive(Default)]
    #[repr(C)]
    struct Resource {
        generation: u32,
    }

    impl ManagedClass for Resource {
        const CLASS_NAME: &'static str = "cast::Resource";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.activator(Self::default)
        }
    }

    #[derive(Default)]
    #[repr(C)]
    struct Texture {
        base: Resource,
        width: u32,
    }

    impl ManagedClass for Texture {
        const CLASS_NAME: &'static str = "cast::Texture";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.extends::<Resource>().activator(Self::default)
        }
    }

    // Texture starts with a Resource and is #[repr(C)].
    unsafe impl Extends<Resource> for Texture {}

    #[derive(Default)]
    struct Material {
        shine: f32,
    }

    impl ManagedClass for Material {
        const CLASS_NAME: &'static str = "cast::Material";

        fn reflect(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
            builder.activator(Self::default)
        }
    }

    #[test]
    fn test_upcast_views_prefix() {
        let heap = ObjectHeap::new();
        let texture = ObjectRef::new_in(
            &heap,
            Texture {
                base: Resource { generation: 7 },
                width: 128,
            },
        );
        let resource: ObjectRef<Resource> = texture.upcast();
        assert_eq!(resource.generation, 7);
        assert_eq!(texture.strong_count(), 2);
        assert_eq!(resource.id(), texture.id());
    }

    #[test]
    fn test_try_cast_follows_registered_chain() {
        let heap = ObjectHeap::new();
        let texture = ObjectRef::new_in(&heap, Texture::default());

        let as_base = texture.try_cast::<Resource>();
        assert!(as_base.is_some());

        let as_material = texture.try_cast::<Material>();
        assert!(as_material.is_none());
    }

    #[test]
    fn test_cast_reports_mismatch() {
        let heap = ObjectHeap::new();
        let resource = ObjectRef::new_in(&heap, Resource::default());
        // A base instance is not its derived class
        let err = resource.cast::<Texture>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid cast from cast::Resource to cast::Texture"
        );
    }

    #[test]
    fn test_erased_downcast() {
        let heap = ObjectHeap::new();
        let erased = ObjectRef::new_in(&heap, Texture::default()).erase();
        assert_eq!(erased.strong_count(), 1);

        let erased = erased.try_downcast::<Material>().unwrap_err();
        let texture = erased.downcast::<Texture>().unwrap();
        assert_eq!(texture.strong_count(), 1);
    }
}
