use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;

/// Gmail encodes bodies with the URL-safe alphabet, sometimes without padding.
const GMAIL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub email_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageList {
    pub messages: Vec<MessageId>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageId {
    pub id: String,
    pub thread_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: String,
    pub payload: Option<MessagePart>,
}

impl GmailMessage {
    /// Value of the last header named exactly `name` in the top-level payload.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .rev()
            .find(|header| header.name == name)
            .map(|header| header.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thread {
    pub id: String,
    pub messages: Vec<GmailMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePart {
    pub mime_type: String,
    pub headers: Vec<Header>,
    pub body: Option<MessagePartBody>,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePartBody {
    pub data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One node of a payload tree. Either a leaf with an encoded body or an
/// inner node with children; `children` is empty rather than absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Part {
    pub mime_type: String,
    pub body: Option<String>,
    pub children: Vec<Part>,
}

impl Part {
    #[cfg(test)]
    pub fn leaf(mime_type: &str, body: Option<String>) -> Self {
        Part { mime_type: mime_type.to_string(), body, children: Vec::new() }
    }

    #[cfg(test)]
    pub fn node(mime_type: &str, children: Vec<Part>) -> Self {
        Part { mime_type: mime_type.to_string(), body: None, children }
    }

    pub fn decode_body(&self) -> Option<Result<String, base64::DecodeError>> {
        let data = self.body.as_deref()?;
        Some(decode_body(data))
    }
}

impl From<MessagePart> for Part {
    fn from(part: MessagePart) -> Self {
        Part {
            mime_type: part.mime_type,
            body: part.body.and_then(|body| body.data).filter(|data| !data.is_empty()),
            children: part.parts.into_iter().map(Part::from).collect(),
        }
    }
}

pub fn decode_body(data: &str) -> Result<String, base64::DecodeError> {
    let bytes = GMAIL_BASE64.decode(data.trim())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
pub fn encode_body(text: &str) -> String {
    GMAIL_BASE64.encode(text)
}

/// A message queued for scanning, carrying the mailbox it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
    pub account: String,
    pub subject: Option<String>,
}

impl MessageRef {
    pub fn new(id: MessageId, account: &str) -> Self {
        MessageRef {
            id: id.id,
            thread_id: id.thread_id,
            account: account.to_string(),
            subject: None,
        }
    }
}
