use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Events a client may send over its connection.
///
/// Wire format is a JSON text frame `{"event": <name>, "data": <payload>}`.
/// Payload field names are camelCase on the wire.
///
/// Delivery of anything triggered by these events is at-most-once and
/// best-effort: an offline target, a full outbound queue, or a store
/// failure all drop the event silently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Bind this connection to a user identifier.
    #[serde(rename = "register")]
    Register(UserId),

    /// Propose a data link to another user.
    #[serde(rename = "send-link-request")]
    SendLinkRequest(LinkProposal),

    /// Accept or decline a previously received link request.
    #[serde(rename = "send-link-response")]
    SendLinkResponse(LinkResponse),

    /// Relay one chunk of an in-flight file transfer.
    #[serde(rename = "send-file-chunk")]
    SendFileChunk(FileChunk),

    /// Mark a transfer finished and clear its progress records.
    #[serde(rename = "complete-file-transfer")]
    CompleteFileTransfer(CompleteTransfer),

    /// Ask whether a transfer from `senderId` to `recipientId` is
    /// resumable.  Data is the `[recipientId, senderId]` pair.
    #[serde(rename = "check-file-transfer")]
    CheckFileTransfer(UserId, UserId),
}

/// Events the server may push to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Delivered to the recipient of a link proposal.
    #[serde(rename = "link-request")]
    LinkRequest(IncomingLinkRequest),

    /// Delivered to the requester when the recipient accepts.
    #[serde(rename = "link-accepted")]
    LinkAccepted(LinkOutcome),

    /// Delivered to the requester when the recipient declines.
    #[serde(rename = "link-declined")]
    LinkDeclined(LinkOutcome),

    /// One relayed chunk, delivered to the recipient.
    #[serde(rename = "file-chunk-received")]
    FileChunkReceived(IncomingFileChunk),

    /// Progress record for a resumable transfer, delivered in reply to
    /// `check-file-transfer`.
    #[serde(rename = "resume-file-transfer")]
    ResumeFileTransfer(TransferSnapshot),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkProposal {
    pub from: UserId,
    pub to: UserId,
    /// Opaque application-level link token; never inspected here.
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    /// The original requester being answered.
    pub from: UserId,
    /// The recipient who is answering.
    pub to: UserId,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub recipient_id: UserId,
    pub file_name: String,
    /// Opaque chunk payload as the client encoded it (typically base64).
    pub chunk_data: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTransfer {
    pub recipient_id: UserId,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingLinkRequest {
    pub from: UserId,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    pub from: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingFileChunk {
    pub file_name: String,
    pub chunk_data: String,
    pub chunk_index: u32,
}

/// Persisted transfer progress as surfaced to a resuming client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferSnapshot {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub file_name: String,
    /// Index of the last chunk the sender reported.
    pub current_chunk: u32,
    pub total_chunks: u32,
}
