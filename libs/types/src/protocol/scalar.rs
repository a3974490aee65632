//! Plain-old-data scalar types that map onto element data types
//!
//! Every [`WireScalar`] is `Pod`, so array payloads are cast straight to and
//! from wire bytes in host order.

use bytemuck::{Pod, Zeroable};

use super::data_type::DataType;

/// A fixed-size value with a wire [`DataType`]
pub trait WireScalar: Pod {
    const DATA_TYPE: DataType;
}

macro_rules! wire_scalar {
    ($($ty:ty => $dt:ident),* $(,)?) => {
        $(impl WireScalar for $ty {
            const DATA_TYPE: DataType = DataType::$dt;
        })*
    };
}

wire_scalar! {
    f64 => Double,
    f32 => Single,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CDouble {
    pub real: f64,
    pub imag: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct CSingle {
    pub real: f32,
    pub imag: f32,
}

/// One-byte boolean; any non-zero byte reads as true
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct WireBool(pub u8);

impl WireBool {
    pub fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for WireBool {
    fn from(b: bool) -> Self {
        Self(b as u8)
    }
}

wire_scalar! {
    CDouble => CDouble,
    CSingle => CSingle,
    WireBool => Bool,
}
