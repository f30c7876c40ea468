use scriptbind_core::{BindError, ObjMut, ObjRef, Runtime, ToRuntime, Value};

use super::{finish, prepare, returns_unit};
use crate::args::{ArgSpec, NativeParam, ParamInfo, fill};

/// A method: a callable whose first parameter is the receiver.
///
/// `Receiver` may be the bound class itself or any of its ancestors; the
/// receiver is resolved through the class ancestry on every call, so a method
/// declared on a base class works on derived instances. A `&S` receiver takes
/// a shared borrow of the object for the duration of the call, `&mut S` an
/// exclusive one.
pub trait NativeMethod<Marker>: 'static {
    type Receiver: 'static;

    fn params() -> Vec<ParamInfo>;

    fn returns_unit() -> bool;

    fn invoke(
        &self,
        rt: &mut Runtime,
        this: &Value,
        spec: &ArgSpec,
        args: &[Value],
    ) -> Result<Value, BindError>;
}

macro_rules! impl_native_method {
    ($($P:ident $p:ident $idx:tt),*) => {
        impl<F, S, R, $($P,)*> NativeMethod<fn(&S, $($P,)*) -> R> for F
        where
            F: Fn(&S, $($P),*) -> R + 'static,
            S: 'static,
            R: ToRuntime + 'static,
            $($P: NativeParam,)*
        {
            type Receiver = S;

            fn params() -> Vec<ParamInfo> {
                vec![$(ParamInfo::of::<$P>()),*]
            }

            fn returns_unit() -> bool {
                returns_unit::<R>()
            }

            #[allow(unused_variables, unused_mut)]
            fn invoke(
                &self,
                rt: &mut Runtime,
                this: &Value,
                spec: &ArgSpec,
                args: &[Value],
            ) -> Result<Value, BindError> {
                let receiver = ObjRef::<S>::from_value(rt, this)?;
                $(let $p = fill::<$P>(spec.slot($idx), $idx, args.get($idx), rt)?;)*
                let mut exports = Vec::new();
                $(let $p = prepare::<$P>(spec.slot($idx), $p, &mut exports);)*
                let result = (self)(&*receiver, $($p),*);
                drop(receiver);
                finish(rt, result, exports)
            }
        }

        impl<F, S, R, $($P,)*> NativeMethod<fn(&mut S, $($P,)*) -> R> for F
        where
            F: Fn(&mut S, $($P),*) -> R + 'static,
            S: 'static,
            R: ToRuntime + 'static,
            $($P: NativeParam,)*
        {
            type Receiver = S;

            fn params() -> Vec<ParamInfo> {
                vec![$(ParamInfo::of::<$P>()),*]
            }

            fn returns_unit() -> bool {
                returns_unit::<R>()
            }

            #[allow(unused_variables, unused_mut)]
            fn invoke(
                &self,
                rt: &mut Runtime,
                this: &Value,
                spec: &ArgSpec,
                args: &[Value],
            ) -> Result<Value, BindError> {
                let mut receiver = ObjMut::<S>::from_value(rt, this)?;
                $(let $p = fill::<$P>(spec.slot($idx), $idx, args.get($idx), rt)?;)*
                let mut exports = Vec::new();
                $(let $p = prepare::<$P>(spec.slot($idx), $p, &mut exports);)*
                let result = (self)(&mut *receiver, $($p),*);
                drop(receiver);
                finish(rt, result, exports)
            }
        }
    };
}

all_arities!(impl_native_method);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Out;
    use scriptbind_core::object::wrap_value;
    use scriptbind_core::{ClassRegistry, NativeFn};

    struct Counter {
        count: i32,
    }

    fn runtime() -> Runtime {
        let mut rt = Runtime::new();
        let classes = ClassRegistry::install(&mut rt);
        let (ctor, proto) = rt.new_constructor(NativeFn::new("Counter", |_, _| Ok(Value::Undefined)));
        classes.register::<Counter>("Counter", ctor, proto).unwrap();
        rt
    }

    fn call<M, F: NativeMethod<M>>(
        rt: &mut Runtime,
        f: F,
        this: &Value,
        args: &[Value],
    ) -> Result<Value, BindError> {
        let spec = ArgSpec::infer(&F::params());
        f.invoke(rt, this, &spec, args)
    }

    #[test]
    fn shared_receiver() {
        let mut rt = runtime();
        let this = wrap_value(&mut rt, Counter { count: 3 }).unwrap();
        let get = |c: &Counter| c.count;
        assert_eq!(call(&mut rt, get, &this, &[]).unwrap(), Value::Int(3));
    }

    #[test]
    fn exclusive_receiver_mutates() {
        let mut rt = runtime();
        let this = wrap_value(&mut rt, Counter { count: 3 }).unwrap();
        let add = |c: &mut Counter, by: i32| {
            c.count += by;
            c.count
        };
        assert_eq!(call(&mut rt, add, &this, &[Value::Int(4)]).unwrap(), Value::Int(7));
        let get = |c: &Counter| c.count;
        assert_eq!(call(&mut rt, get, &this, &[]).unwrap(), Value::Int(7));
    }

    #[test]
    fn method_with_output() {
        let mut rt = runtime();
        let this = wrap_value(&mut rt, Counter { count: 9 }).unwrap();
        let halves = |c: &Counter, rest: Out<i32>| {
            rest.set(c.count % 2);
            c.count / 2
        };
        assert_eq!(
            call(&mut rt, halves, &this, &[]).unwrap(),
            Value::Array(vec![Value::Int(4), Value::Int(1)])
        );
    }

    #[test]
    fn missing_receiver() {
        let mut rt = runtime();
        let get = |c: &Counter| c.count;
        assert_eq!(
            call(&mut rt, get, &Value::Int(1), &[]).unwrap_err(),
            BindError::MissingObject
        );
        let plain = Value::Object(rt.new_object());
        assert_eq!(
            call(&mut rt, get, &plain, &[]).unwrap_err(),
            BindError::MissingObject
        );
    }

    #[test]
    fn receiver_and_argument_conflict() {
        let mut rt = runtime();
        let this = wrap_value(&mut rt, Counter { count: 1 }).unwrap();
        let absorb = |c: &mut Counter, other: ObjRef<Counter>| c.count += other.count;
        let err = call(&mut rt, absorb, &this, &[this.clone()]).unwrap_err();
        assert!(matches!(err, BindError::AlreadyBorrowed { .. }));
    }
}
