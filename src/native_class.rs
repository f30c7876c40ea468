//! Conversions for bound class types.

/// Implement the conversion traits for a type bound as a script class.
///
/// - `native_class!(T)`: returning `T` from native code wraps it by value in
///   a new instance of its class.
/// - `native_class!(T, clone)`: additionally accepts instances (of `T` or of
///   a class derived from it) as `T` parameters and variable values, by
///   cloning the wrapped value.
///
/// ```ignore
/// #[derive(Clone)]
/// struct Point { x: i32, y: i32 }
/// native_class!(Point, clone);
///
/// builder.add_function("mirror", |p: Point| Point { x: p.y, y: p.x })?;
/// ```
#[macro_export]
macro_rules! native_class {
    ($ty:ty) => {
        impl $crate::ToRuntime for $ty {
            fn to_runtime(
                self,
                rt: &mut $crate::Runtime,
            ) -> ::std::result::Result<$crate::Value, $crate::BindError> {
                $crate::object::wrap_value(rt, self)
            }
        }
    };
    ($ty:ty, clone) => {
        $crate::native_class!($ty);

        impl $crate::FromRuntime for $ty {
            fn from_runtime(
                value: &$crate::Value,
                rt: &$crate::Runtime,
            ) -> ::std::result::Result<Self, $crate::BindError> {
                let object = $crate::ObjRef::<$ty>::from_value(rt, value)?;
                ::std::result::Result::Ok(::std::clone::Clone::clone(&*object))
            }
        }

        impl $crate::NativeParam for $ty {
            type Value = $ty;

            fn extract(
                value: &$crate::Value,
                rt: &$crate::Runtime,
            ) -> ::std::result::Result<$ty, $crate::BindError> {
                <$ty as $crate::FromRuntime>::from_runtime(value, rt)
            }

            fn prepare(value: $ty) -> ($ty, ::std::option::Option<$crate::args::Export>) {
                (value, ::std::option::Option::None)
            }
        }
    };
}
