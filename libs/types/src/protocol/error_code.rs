//! Error codes carried in the `error` field of response entries

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Remote error classification sent in response entries
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageErrorType {
    None = 0,
    ConnectionError = 1,
    ProtocolError = 2,
    ServiceNotFound = 3,
    ObjectNotFound = 4,
    InvalidEndpoint = 5,
    EndpointCommunicationFatalError = 6,
    NodeNotFound = 7,
    ServiceError = 8,
    MemberNotFound = 9,
    MemberFormatMismatch = 10,
    DataTypeMismatch = 11,
    DataTypeError = 12,
    DataSerializationError = 13,
    MessageEntryNotFound = 14,
    MessageElementNotFound = 15,
    UnknownError = 16,
    InvalidOperation = 17,
    InvalidArgument = 18,
    OperationFailed = 19,
    NullValue = 20,
    InternalError = 21,
    SystemResourcePermissionDenied = 22,
    OutOfSystemResource = 23,
    SystemResourceError = 24,
    ResourceNotFound = 25,
    IoError = 26,
    BufferLimitViolation = 27,
    ServiceDefinitionError = 28,
    OutOfRange = 29,
    KeyNotFound = 30,
    RemoteError = 100,
    RequestTimeout = 101,
    ReadOnlyMember = 102,
    WriteOnlyMember = 103,
    NotImplementedError = 104,
    MemberBusy = 105,
    ValueNotSet = 106,
    AbortOperation = 107,
    OperationAborted = 108,
    StopIteration = 109,
    AuthenticationError = 150,
    ObjectLockedError = 151,
    PermissionDenied = 152,
}

impl Default for MessageErrorType {
    fn default() -> Self {
        MessageErrorType::None
    }
}

impl MessageErrorType {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Fully qualified error name sent in the `errorname` element of error responses
    pub const fn error_name(self) -> &'static str {
        match self {
            MessageErrorType::None => "",
            MessageErrorType::ConnectionError => "RobotRaconteur.ConnectionError",
            MessageErrorType::ProtocolError => "RobotRaconteur.ProtocolError",
            MessageErrorType::ServiceNotFound => "RobotRaconteur.ServiceNotFound",
            MessageErrorType::ObjectNotFound => "RobotRaconteur.ObjectNotFound",
            MessageErrorType::InvalidEndpoint => "RobotRaconteur.InvalidEndpoint",
            MessageErrorType::EndpointCommunicationFatalError => {
                "RobotRaconteur.EndpointCommunicationFatalError"
            }
            MessageErrorType::NodeNotFound => "RobotRaconteur.NodeNotFound",
            MessageErrorType::ServiceError => "RobotRaconteur.ServiceError",
            MessageErrorType::MemberNotFound => "RobotRaconteur.MemberNotFound",
            MessageErrorType::MemberFormatMismatch => "RobotRaconteur.MemberFormatMismatch",
            MessageErrorType::DataTypeMismatch => "RobotRaconteur.DataTypeMismatch",
            MessageErrorType::DataTypeError => "RobotRaconteur.DataTypeError",
            MessageErrorType::DataSerializationError => "RobotRaconteur.DataSerializationError",
            MessageErrorType::MessageEntryNotFound => "RobotRaconteur.MessageEntryNotFound",
            MessageErrorType::MessageElementNotFound => "RobotRaconteur.MessageElementNotFound",
            MessageErrorType::UnknownError => "RobotRaconteur.UnknownError",
            MessageErrorType::InvalidOperation => "RobotRaconteur.InvalidOperation",
            MessageErrorType::InvalidArgument => "RobotRaconteur.InvalidArgument",
            MessageErrorType::OperationFailed => "RobotRaconteur.OperationFailed",
            MessageErrorType::NullValue => "RobotRaconteur.NullValue",
            MessageErrorType::InternalError => "RobotRaconteur.InternalError",
            MessageErrorType::SystemResourcePermissionDenied => {
                "RobotRaconteur.SystemResourcePermissionDenied"
            }
            MessageErrorType::OutOfSystemResource => "RobotRaconteur.OutOfSystemResource",
            MessageErrorType::SystemResourceError => "RobotRaconteur.SystemResourceError",
            MessageErrorType::ResourceNotFound => "RobotRaconteur.ResourceNotFound",
            MessageErrorType::IoError => "RobotRaconteur.IOError",
            MessageErrorType::BufferLimitViolation => "RobotRaconteur.BufferLimitViolation",
            MessageErrorType::ServiceDefinitionError => "RobotRaconteur.ServiceDefinitionError",
            MessageErrorType::OutOfRange => "RobotRaconteur.OutOfRange",
            MessageErrorType::KeyNotFound => "RobotRaconteur.KeyNotFound",
            MessageErrorType::RemoteError => "RobotRaconteur.RemoteError",
            MessageErrorType::RequestTimeout => "RobotRaconteur.RequestTimeout",
            MessageErrorType::ReadOnlyMember => "RobotRaconteur.ReadOnlyMember",
            MessageErrorType::WriteOnlyMember => "RobotRaconteur.WriteOnlyMember",
            MessageErrorType::NotImplementedError => "RobotRaconteur.NotImplementedError",
            MessageErrorType::MemberBusy => "RobotRaconteur.MemberBusy",
            MessageErrorType::ValueNotSet => "RobotRaconteur.ValueNotSet",
            MessageErrorType::AbortOperation => "RobotRaconteur.AbortOperation",
            MessageErrorType::OperationAborted => "RobotRaconteur.OperationAborted",
            MessageErrorType::StopIteration => "RobotRaconteur.StopIteration",
            MessageErrorType::AuthenticationError => "RobotRaconteur.AuthenticationError",
            MessageErrorType::ObjectLockedError => "RobotRaconteur.ObjectLockedError",
            MessageErrorType::PermissionDenied => "RobotRaconteur.PermissionDenied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_are_qualified() {
        for code in 1u16..=152 {
            if let Ok(err) = MessageErrorType::try_from(code) {
                assert!(err.error_name().starts_with("RobotRaconteur."), "{err:?}");
            }
        }
        assert_eq!(MessageErrorType::None.error_name(), "");
    }

    #[test]
    fn test_default_is_none() {
        assert_eq!(MessageErrorType::default().code(), 0);
    }
}
