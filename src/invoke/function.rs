use scriptbind_core::{BindError, Runtime, ToRuntime, Value};

use super::{finish, prepare, returns_unit};
use crate::args::{ArgSpec, NativeParam, ParamInfo, fill};

/// A free function or closure callable from script.
pub trait NativeFunction<Marker>: 'static {
    fn params() -> Vec<ParamInfo>;

    fn returns_unit() -> bool;

    fn invoke(&self, rt: &mut Runtime, spec: &ArgSpec, args: &[Value]) -> Result<Value, BindError>;
}

macro_rules! impl_native_function {
    ($($P:ident $p:ident $idx:tt),*) => {
        impl<F, R, $($P,)*> NativeFunction<fn($($P,)*) -> R> for F
        where
            F: Fn($($P),*) -> R + 'static,
            R: ToRuntime + 'static,
            $($P: NativeParam,)*
        {
            fn params() -> Vec<ParamInfo> {
                vec![$(ParamInfo::of::<$P>()),*]
            }

            fn returns_unit() -> bool {
                returns_unit::<R>()
            }

            #[allow(unused_variables, unused_mut)]
            fn invoke(&self, rt: &mut Runtime, spec: &ArgSpec, args: &[Value]) -> Result<Value, BindError> {
                $(let $p = fill::<$P>(spec.slot($idx), $idx, args.get($idx), rt)?;)*
                let mut exports = Vec::new();
                $(let $p = prepare::<$P>(spec.slot($idx), $p, &mut exports);)*
                let result = (self)($($p),*);
                finish(rt, result, exports)
            }
        }
    };
}

all_arities!(impl_native_function);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::args::Out;
    use scriptbind_core::ConversionError;

    fn call<M, F: NativeFunction<M>>(f: F, spec: ArgSpec, args: &[Value]) -> Result<Value, BindError> {
        let mut rt = Runtime::new();
        f.invoke(&mut rt, &spec, args)
    }

    fn inferred<M, F: NativeFunction<M>>(f: F, args: &[Value]) -> Result<Value, BindError> {
        let spec = ArgSpec::infer(&F::params());
        call(f, spec, args)
    }

    #[test]
    fn zero_arity() {
        assert_eq!(inferred(|| 42i32, &[]).unwrap(), Value::Int(42));
        assert_eq!(inferred(|| {}, &[]).unwrap(), Value::Undefined);
    }

    #[test]
    fn adds() {
        let add = |a: i32, b: i32| a + b;
        assert_eq!(inferred(add, &[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
    }

    #[test]
    fn eight_parameters() {
        let sum = |a: u8, b: u16, c: u32, d: u64, e: i8, f: i16, g: i32, h: i64| {
            a as i64 + b as i64 + c as i64 + d as i64 + e as i64 + f as i64 + g as i64 + h
        };
        let args: Vec<Value> = (1..=8).map(Value::Int).collect();
        assert_eq!(inferred(sum, &args).unwrap(), Value::Int(36));
        assert_eq!(params_of(&sum).len(), 8);
    }

    fn params_of<M, F: NativeFunction<M>>(_: &F) -> Vec<ParamInfo> {
        F::params()
    }

    #[test]
    fn missing_argument_aborts_before_the_call() {
        let called = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = called.clone();
        let f = move |_a: i32, _b: bool| flag.set(true);
        let err = inferred(f, &[Value::Int(1)]).unwrap_err();
        assert_eq!(err, BindError::at_argument(1, ConversionError::MissingArgument));
        assert!(!called.get());
    }

    #[test]
    fn clamp_with_reference() {
        let clamp = |v: Out<i32>, lo: i32, hi: i32| {
            let current = v.get();
            let clamped = current.clamp(lo, hi);
            v.set(clamped);
            clamped != current
        };
        let result = call(
            clamp,
            args![reference, required, required],
            &[Value::Int(15), Value::Int(0), Value::Int(10)],
        )
        .unwrap();
        assert_eq!(result, Value::Array(vec![Value::Bool(true), Value::Int(10)]));
    }

    #[test]
    fn unit_return_with_outputs_omits_the_return() {
        let split = |v: f64, whole: Out<i64>, frac: Out<f64>| {
            whole.set(v.trunc() as i64);
            frac.set(v.fract());
        };
        let result = call(split, args![required, output, output], &[Value::Float(2.5)]).unwrap();
        assert_eq!(result, Value::Array(vec![Value::Int(2), Value::Float(0.5)]));
    }

    #[test]
    fn output_starts_at_zero() {
        let seen = |out: Out<i32>| out.get();
        let result = call(seen, args![output], &[Value::Int(77)]).unwrap();
        assert_eq!(result, Value::Array(vec![Value::Int(0), Value::Int(0)]));
    }

    #[test]
    fn required_out_is_not_exported() {
        let f = |out: Out<i32>| out.get() + 1;
        let result = call(f, args![required], &[Value::Int(4)]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn retained_reference_still_exports() {
        let kept = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let store = kept.clone();
        let f = move |out: Out<i32>| {
            out.set(5);
            store.borrow_mut().push(out.clone());
        };
        let result = call(f, args![reference], &[Value::Int(1)]).unwrap();
        assert_eq!(result, Value::Array(vec![Value::Int(5)]));
        assert_eq!(kept.borrow().len(), 1);
        assert_eq!(kept.borrow()[0].get(), 5);
    }

    #[test]
    fn errors_from_native_code() {
        let f = |n: i32| -> Result<i32, String> {
            if n < 0 { Err("negative".to_string()) } else { Ok(n) }
        };
        assert_eq!(inferred(f, &[Value::Int(1)]).unwrap(), Value::Int(1));
        assert_eq!(inferred(f, &[Value::Int(-1)]).unwrap_err(), BindError::native("negative"));
    }
}
