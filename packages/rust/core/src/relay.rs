//! Message relay between the page side and the background side.
//!
//! Only `courseInfo` messages are acknowledged. Everything else, including
//! messages that fail to parse, gets no reply.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Acknowledgement text for a `courseInfo` message.
pub const ACK_MESSAGE: &str = "Data received in background";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "courseInfo")]
    CourseInfo {
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReply {
    pub message: String,
}

/// Handle one incoming message, returning the reply to send back, if any.
pub fn handle_message(raw: &serde_json::Value) -> Option<RelayReply> {
    match RelayMessage::deserialize(raw) {
        Ok(RelayMessage::CourseInfo { data }) => {
            info!(data = %data, "course info received");
            Some(RelayReply {
                message: ACK_MESSAGE.to_string(),
            })
        }
        Err(e) => {
            debug!(error = %e, "ignoring relay message");
            None
        }
    }
}
