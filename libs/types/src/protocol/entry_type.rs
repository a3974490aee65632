//! Message entry type codes
//!
//! Requests carry odd codes and their responses the following even code.
//! Codes below [`SPECIAL_REQUEST_LIMIT`] are connection-level operations
//! (stream setup, client connect, service discovery) that the node handles
//! before anything reaches the service layer.

use crate::protocol::constants::SPECIAL_REQUEST_LIMIT;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Operation code of a message entry
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntryType {
    Null = 0,
    StreamOp = 1,
    StreamOpRet = 2,
    StreamCheckCapability = 3,
    StreamCheckCapabilityRet = 4,
    StringTableOp = 5,
    StringTableOpRet = 6,
    GetServiceDesc = 101,
    GetServiceDescRet = 102,
    ObjectTypeName = 103,
    ObjectTypeNameRet = 104,
    ServiceClosed = 105,
    ServiceClosedRet = 106,
    ConnectClient = 107,
    ConnectClientRet = 108,
    DisconnectClient = 109,
    DisconnectClientRet = 110,
    ConnectionTest = 111,
    ConnectionTestRet = 112,
    GetNodeInfo = 113,
    GetNodeInfoRet = 114,
    ReconnectClient = 115,
    ReconnectClientRet = 116,
    NodeCheckCapability = 117,
    NodeCheckCapabilityRet = 118,
    GetServiceAttributes = 119,
    GetServiceAttributesRet = 120,
    ConnectClientCombined = 121,
    ConnectClientCombinedRet = 122,
    EndpointCheckCapability = 501,
    EndpointCheckCapabilityRet = 502,
    ServiceCheckCapabilityReq = 1101,
    ServiceCheckCapabilityRet = 1102,
    ClientKeepAliveReq = 1105,
    ClientKeepAliveRet = 1106,
    ClientSessionOpReq = 1107,
    ClientSessionOpRet = 1108,
    ServicePathReleasedReq = 1109,
    ServicePathReleasedRet = 1110,
    PropertyGetReq = 1111,
    PropertyGetRes = 1112,
    PropertySetReq = 1113,
    PropertySetRes = 1114,
    FunctionCallReq = 1121,
    FunctionCallRes = 1122,
    GeneratorNextReq = 1123,
    GeneratorNextRes = 1124,
    EventReq = 1131,
    EventRes = 1132,
    PipePacket = 1141,
    PipePacketRet = 1142,
    PipeConnectReq = 1143,
    PipeConnectRet = 1144,
    PipeDisconnectReq = 1145,
    PipeDisconnectRet = 1146,
    PipeClosed = 1147,
    PipeClosedRet = 1148,
    CallbackCallReq = 1151,
    CallbackCallRet = 1152,
    WirePacket = 1161,
    WirePacketRet = 1162,
    WireConnectReq = 1163,
    WireConnectRet = 1164,
    WireDisconnectReq = 1165,
    WireDisconnectRet = 1166,
    WireClosed = 1167,
    WireClosedRet = 1168,
    MemoryRead = 1171,
    MemoryReadRet = 1172,
    MemoryWrite = 1173,
    MemoryWriteRet = 1174,
    MemoryGetParam = 1175,
    MemoryGetParamRet = 1176,
    WirePeekInValueReq = 1181,
    WirePeekInValueRet = 1182,
    WirePeekOutValueReq = 1183,
    WirePeekOutValueRet = 1184,
    WirePokeOutValueReq = 1185,
    WirePokeOutValueRet = 1186,
}

impl EntryType {
    /// Raw wire code
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Odd codes are requests
    #[inline]
    pub const fn is_request(self) -> bool {
        Self::is_request_code(self as u16)
    }

    #[inline]
    pub const fn is_request_code(code: u16) -> bool {
        code % 2 == 1
    }

    /// Matching response type for a request, `None` for responses
    pub fn response(self) -> Option<EntryType> {
        if !self.is_request() {
            return None;
        }
        EntryType::try_from(self as u16 + 1).ok()
    }

    /// Connection-level entries handled by the node itself
    #[inline]
    pub const fn is_special(self) -> bool {
        (self as u16) < SPECIAL_REQUEST_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_request_has_a_response() {
        for code in 0u16..=1200 {
            if let Ok(entry) = EntryType::try_from(code) {
                if entry.is_request() {
                    let response = entry.response().expect("request without response");
                    assert_eq!(response.code(), code + 1);
                    assert!(!response.is_request());
                }
            }
        }
    }

    #[test]
    fn test_special_boundary() {
        assert!(EntryType::StreamOp.is_special());
        assert!(EntryType::ConnectClientCombinedRet.is_special());
        assert!(!EntryType::EndpointCheckCapability.is_special());
        assert!(!EntryType::FunctionCallReq.is_special());
    }

    #[test]
    fn test_null_is_not_request() {
        assert!(!EntryType::Null.is_request());
        assert_eq!(EntryType::Null.response(), None);
        assert_eq!(EntryType::PropertyGetRes.response(), None);
    }
}
