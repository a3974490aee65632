//! Element data type codes
//!
//! Every element carries a 16-bit type code describing its payload. Codes below
//! 100 are scalar or array kinds with a fixed item size; codes from 101 up are
//! composite kinds whose payload is either a nested element sequence or a named
//! reference resolved by the service layer.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Element payload type code
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    Void = 0,
    Double = 1,
    Single = 2,
    Int8 = 3,
    UInt8 = 4,
    Int16 = 5,
    UInt16 = 6,
    Int32 = 7,
    UInt32 = 8,
    Int64 = 9,
    UInt64 = 10,
    String = 11,
    CDouble = 12,
    CSingle = 13,
    Bool = 14,
    Structure = 101,
    MapInt32 = 102,
    MapString = 103,
    Object = 104,
    VarValue = 105,
    VarObject = 106,
    List = 108,
    Pod = 109,
    PodArray = 110,
    PodMultiDimArray = 111,
    Enum = 112,
    NamedType = 113,
    NamedArray = 114,
    NamedArrayArray = 115,
    NamedArrayMultiDimArray = 116,
    MultiDimArray = 117,
}

impl DataType {
    /// Raw wire code
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether the payload of this type is a nested element sequence
    pub const fn is_nested(self) -> bool {
        matches!(
            self,
            DataType::Structure
                | DataType::MapInt32
                | DataType::MapString
                | DataType::List
                | DataType::MultiDimArray
                | DataType::Pod
                | DataType::PodArray
                | DataType::PodMultiDimArray
                | DataType::NamedArrayArray
                | DataType::NamedArrayMultiDimArray
        )
    }

    /// Same check on a raw code, for headers carrying codes this build does not know
    pub fn is_nested_code(code: u16) -> bool {
        DataType::try_from(code).map(DataType::is_nested).unwrap_or(false)
    }

    /// Byte size of one payload item for fixed-size kinds
    ///
    /// Strings report 1 (one byte per item); composite and void kinds have no
    /// fixed item size.
    pub const fn element_size(self) -> Option<usize> {
        match self {
            DataType::Double | DataType::Int64 | DataType::UInt64 | DataType::CSingle => Some(8),
            DataType::Single | DataType::Int32 | DataType::UInt32 => Some(4),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int8 | DataType::UInt8 | DataType::Bool | DataType::String => Some(1),
            DataType::CDouble => Some(16),
            _ => None,
        }
    }

    /// Whether this is a numeric, complex or boolean kind
    pub const fn is_number(self) -> bool {
        (self as u16) >= 1 && (self as u16) <= 14 && !matches!(self, DataType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_u16() {
        for code in [0u16, 1, 11, 14, 101, 108, 117] {
            let dt = DataType::try_from(code).unwrap();
            assert_eq!(u16::from(dt), code);
        }
    }

    #[test]
    fn test_unassigned_codes_rejected() {
        assert!(DataType::try_from(15u16).is_err());
        assert!(DataType::try_from(107u16).is_err());
        assert!(DataType::try_from(118u16).is_err());
    }

    #[test]
    fn test_nested_kinds() {
        assert!(DataType::Structure.is_nested());
        assert!(DataType::MapString.is_nested());
        assert!(DataType::NamedArrayMultiDimArray.is_nested());
        assert!(!DataType::Object.is_nested());
        assert!(!DataType::NamedArray.is_nested());
        assert!(!DataType::Double.is_nested());
        assert!(!DataType::is_nested_code(107));
        assert!(DataType::is_nested_code(108));
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(DataType::Double.element_size(), Some(8));
        assert_eq!(DataType::CDouble.element_size(), Some(16));
        assert_eq!(DataType::CSingle.element_size(), Some(8));
        assert_eq!(DataType::Bool.element_size(), Some(1));
        assert_eq!(DataType::String.element_size(), Some(1));
        assert_eq!(DataType::Structure.element_size(), None);
        assert!(DataType::Bool.is_number());
        assert!(!DataType::String.is_number());
        assert!(!DataType::Void.is_number());
    }
}
