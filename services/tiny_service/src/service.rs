//! `tiny_service` object: property `d1` and function `add_two_numbers`

use rrlite_codec::{ProtocolError, ProtocolResult};
use rrlite_network::{ConnectionId, Event, Handled, Node, ReceivedMessage};
use rrlite_types::{DataType, EntryType, MessageErrorType};
use tracing::{debug, info, warn};

pub const SERVICE_PATH: &str = "tiny_service";

#[derive(Debug, Default)]
pub struct TinyService {
    d1: f64,
}

impl TinyService {
    pub fn d1(&self) -> f64 {
        self.d1
    }

    /// Handle every event of the current cycle, consuming `NextCycle` last
    ///
    /// Messages whose response could not be queued stay pending and come
    /// back next cycle.
    pub fn dispatch_cycle(&mut self, node: &mut Node) -> ProtocolResult<()> {
        loop {
            let event = node.next_event();
            let consume = match &event {
                Event::NextCycle => {
                    node.consume_event(&event)?;
                    return Ok(());
                }
                Event::ConnectionConnected(id) => {
                    info!(connection = %id, "client connected");
                    true
                }
                Event::ConnectionClosed(id) => {
                    info!(connection = %id, "client disconnected");
                    true
                }
                Event::ConnectionError { connection, error } => {
                    warn!(%connection, %error, "connection error");
                    true
                }
                Event::MessageReceived(message) => self.on_message(node, message),
            };
            if consume {
                node.consume_event(&event)?;
            }
        }
    }

    /// Returns whether the event still needs consuming
    fn on_message(&mut self, node: &mut Node, message: &ReceivedMessage) -> bool {
        match node.handle_special_request(message) {
            Ok(Handled::Unhandled) => {}
            Ok(Handled::Consumed) | Err(ProtocolError::Retry) => return false,
            Err(e) => {
                warn!(connection = %message.connection, error = %e, "session request failed");
                return false;
            }
        }

        match self.respond(node, message) {
            Ok(()) => true,
            Err(ProtocolError::Retry) => false,
            Err(e) => {
                warn!(connection = %message.connection, error = %e, "response failed");
                if let Ok(conn) = node.connection_mut(message.connection) {
                    conn.fail(e);
                }
                true
            }
        }
    }

    fn respond(&mut self, node: &mut Node, message: &ReceivedMessage) -> ProtocolResult<()> {
        let id = message.connection;
        let entry = &message.entry;
        if entry.service_path.as_bytes() != SERVICE_PATH.as_bytes() {
            let error = MessageErrorType::ServiceNotFound;
            return node.send_error_response(id, entry, error, error.error_name(), "Service not found");
        }
        debug!(connection = %id, entry_type = entry.entry_type, member = %entry.member_name, "service request");

        match entry.kind() {
            Some(EntryType::PropertyGetReq) if entry.member_is("d1") => {
                let value = self.d1;
                node.send_response(id, entry, |elements| elements.write_scalar("value", value))
            }
            Some(EntryType::PropertySetReq) if entry.member_is("d1") => {
                match read_f64(node, id, "value") {
                    Ok(value) => {
                        self.d1 = value;
                        node.send_empty_response(id, entry)
                    }
                    Err(e) => reject(node, message, e),
                }
            }
            Some(EntryType::FunctionCallReq) if entry.member_is("add_two_numbers") => {
                let args = read_f64(node, id, "a").and_then(|a| Ok((a, read_f64(node, id, "b")?)));
                match args {
                    Ok((a, b)) => {
                        node.send_response(id, entry, |elements| elements.write_scalar("return", a + b))
                    }
                    Err(e) => reject(node, message, e),
                }
            }
            _ => {
                let error = MessageErrorType::MemberNotFound;
                node.send_error_response(id, entry, error, error.error_name(), "Member not found")
            }
        }
    }
}

fn read_f64(node: &Node, id: ConnectionId, name: &str) -> ProtocolResult<f64> {
    let reader = node.connection(id)?.message_receive()?;
    reader
        .begin_entries()?
        .find_element_verify_scalar(name, DataType::Double)?
        .read_scalar()
}

/// Answer a malformed request with the error's wire code
fn reject(node: &mut Node, message: &ReceivedMessage, err: ProtocolError) -> ProtocolResult<()> {
    if err.is_retry() {
        return Err(err);
    }
    let error = err.wire_code();
    debug!(connection = %message.connection, error = %err, "rejecting request");
    node.send_error_response(message.connection, &message.entry, error, error.error_name(), &err.to_string())
}
