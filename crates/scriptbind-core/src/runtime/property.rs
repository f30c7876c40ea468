//! Own properties and their attributes.

use bitflags::bitflags;

use super::function::NativeFn;
use crate::value::Value;

bitflags! {
    /// Property attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyFlags: u8 {
        /// Script assignment fails.
        const READ_ONLY   = 0x01;
        /// Not listed by key enumeration.
        const DONT_ENUM   = 0x02;
        /// Script deletion fails.
        const DONT_DELETE = 0x04;

        /// Attributes of every entry installed by the binding builder.
        const FROZEN = Self::READ_ONLY.bits() | Self::DONT_DELETE.bits();
    }
}

#[derive(Clone)]
pub enum PropertyValue {
    Data(Value),
    /// Getter/setter pair; both receive the object the lookup started from as `this`.
    Accessor {
        get: Option<NativeFn>,
        set: Option<NativeFn>,
    },
}

#[derive(Clone)]
pub struct Property {
    pub value: PropertyValue,
    pub flags: PropertyFlags,
}

impl Property {
    pub fn data(value: Value, flags: PropertyFlags) -> Self {
        Self {
            value: PropertyValue::Data(value),
            flags,
        }
    }

    pub fn accessor(get: Option<NativeFn>, set: Option<NativeFn>, flags: PropertyFlags) -> Self {
        Self {
            value: PropertyValue::Accessor { get, set },
            flags,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(PropertyFlags::READ_ONLY)
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self.value, PropertyValue::Accessor { .. })
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            PropertyValue::Data(v) => f
                .debug_struct("Property")
                .field("value", v)
                .field("flags", &self.flags)
                .finish(),
            PropertyValue::Accessor { get, set } => f
                .debug_struct("Property")
                .field("getter", &get.is_some())
                .field("setter", &set.is_some())
                .field("flags", &self.flags)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_is_read_only_and_undeletable() {
        assert!(PropertyFlags::FROZEN.contains(PropertyFlags::READ_ONLY));
        assert!(PropertyFlags::FROZEN.contains(PropertyFlags::DONT_DELETE));
        assert!(!PropertyFlags::FROZEN.contains(PropertyFlags::DONT_ENUM));
    }

    #[test]
    fn data_property() {
        let p = Property::data(Value::Int(1), PropertyFlags::READ_ONLY);
        assert!(p.is_read_only());
        assert!(!p.is_accessor());
    }

    #[test]
    fn accessor_property() {
        let p = Property::accessor(None, None, PropertyFlags::empty());
        assert!(p.is_accessor());
        assert!(!p.is_read_only());
    }
}
