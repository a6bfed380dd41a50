/// Defines a newtype wrapper around `WrappedRcRefCell<$inner>`.
///
/// `nimbus_core::utils::WrappedRcRefCell` is a generic type defined in a
/// different crate, so a plain `type XRef = WrappedRcRefCell<X>;` alias
/// cannot carry inherent impls or foreign-trait impls (orphan rules apply
/// to the underlying type, not the alias name). This macro creates a
/// real local newtype with the same `.get()`/`.get_mut()`/`.wrap()`
/// surface (via `Deref`/`DerefMut`) so call sites are unaffected.
macro_rules! wrapped_ref {
    ($name:ident, $inner:ty) => {
        pub struct $name(::nimbus_core::utils::WrappedRcRefCell<$inner>);

        impl $name {
            #[inline]
            #[allow(dead_code)]
            pub fn wrap(t: $inner) -> Self {
                $name(::nimbus_core::utils::WrappedRcRefCell::wrap(t))
            }
        }

        impl ::std::ops::Deref for $name {
            type Target = ::nimbus_core::utils::WrappedRcRefCell<$inner>;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl ::std::ops::DerefMut for $name {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl Clone for $name {
            #[inline]
            fn clone(&self) -> Self {
                $name(self.0.clone())
            }
        }

        impl PartialEq for $name {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl ::std::hash::Hash for $name {
            #[inline]
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }
    };
}
