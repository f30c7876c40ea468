use scriptbind_core::{BindError, Runtime, Value};

use super::prepare;
use crate::args::{ArgSpec, Export, NativeParam, ParamInfo, fill};

/// A callable producing a new `T` for a class constructor.
///
/// Output and reference slots are seeded like for functions, but nothing is
/// exported: a constructor's result is the instance.
pub trait NativeConstructor<T, Marker>: 'static {
    fn params() -> Vec<ParamInfo>;

    fn construct(&self, rt: &Runtime, spec: &ArgSpec, args: &[Value]) -> Result<T, BindError>;
}

macro_rules! impl_native_constructor {
    ($($P:ident $p:ident $idx:tt),*) => {
        impl<F, T, $($P,)*> NativeConstructor<T, fn($($P,)*) -> T> for F
        where
            F: Fn($($P),*) -> T + 'static,
            T: 'static,
            $($P: NativeParam,)*
        {
            fn params() -> Vec<ParamInfo> {
                vec![$(ParamInfo::of::<$P>()),*]
            }

            #[allow(unused_variables, unused_mut)]
            fn construct(&self, rt: &Runtime, spec: &ArgSpec, args: &[Value]) -> Result<T, BindError> {
                $(let $p = fill::<$P>(spec.slot($idx), $idx, args.get($idx), rt)?;)*
                let mut exports: Vec<Export> = Vec::new();
                $(let $p = prepare::<$P>(spec.slot($idx), $p, &mut exports);)*
                Ok((self)($($p),*))
            }
        }
    };
}

all_arities!(impl_native_constructor);
