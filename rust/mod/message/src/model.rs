use msgpush_sql::{Row, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MsgStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a queued message.
///
/// ```text
/// PENDING → FINAL       (dispatched)
///         → CANCELLED
/// ```
///
/// Only PENDING messages may be edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgStatus {
    #[default]
    Pending,
    Cancelled,
    Final,
}

impl MsgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Cancelled => "CANCELLED",
            Self::Final => "FINAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "CANCELLED" => Some(Self::Cancelled),
            "FINAL" => Some(Self::Final),
            _ => None,
        }
    }
}

impl std::fmt::Display for MsgStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records: one per message kind, mapped 1:1 to SQL columns
// ---------------------------------------------------------------------------

/// An email waiting to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: String,
    pub content: String,
    pub send_time: String,
    /// Recipient address.
    pub destination: String,
    #[serde(default)]
    pub status: MsgStatus,
    #[serde(default)]
    pub version: i64,
}

/// A WeChat template message. `content` is the already-serialized template data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeChat {
    pub id: String,
    pub content: String,
    pub send_time: String,
    /// Recipient open id.
    pub touser: String,
    #[serde(default)]
    pub status: MsgStatus,
    #[serde(default)]
    pub version: i64,
}

/// A text message to a mobile number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sms {
    pub id: String,
    pub content: String,
    pub send_time: String,
    pub mobile: String,
    #[serde(default)]
    pub status: MsgStatus,
    #[serde(default)]
    pub version: i64,
}

/// Storage behaviour shared by the three message kinds.
///
/// Every kind persists the same column shape; only the table and the
/// recipient column differ.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table holding rows of this kind.
    const TABLE: &'static str;

    /// Name of the recipient column.
    const DESTINATION: &'static str;

    /// Column order used by inserts and batch upserts. `version` is last.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;
    fn status(&self) -> MsgStatus;
    fn version(&self) -> i64;

    /// Recipient, whatever the kind calls it.
    fn destination(&self) -> &str;

    /// Merge an edit into this snapshot: content and send time always
    /// replace, the recipient only when one was supplied. `version` is
    /// left alone; storage owns it.
    fn apply(&mut self, edit: &EditFields);

    fn set_version(&mut self, version: i64);

    /// Column values in [`Record::COLUMNS`] order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild from a `SELECT` over [`Record::COLUMNS`].
    fn from_row(row: &Row) -> Option<Self>;
}

macro_rules! impl_record {
    ($ty:ident, $table:literal, $dest:ident) => {
        impl Record for $ty {
            const TABLE: &'static str = $table;
            const DESTINATION: &'static str = stringify!($dest);
            const COLUMNS: &'static [&'static str] = &[
                "id",
                "content",
                "send_time",
                stringify!($dest),
                "status",
                "version",
            ];

            fn id(&self) -> &str {
                &self.id
            }

            fn status(&self) -> MsgStatus {
                self.status
            }

            fn version(&self) -> i64 {
                self.version
            }

            fn destination(&self) -> &str {
                &self.$dest
            }

            fn apply(&mut self, edit: &EditFields) {
                self.content = edit.content.clone();
                self.send_time = edit.send_time.clone();
                if let Some(dest) = &edit.destination {
                    self.$dest = dest.clone();
                }
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }

            fn to_values(&self) -> Vec<Value> {
                vec![
                    Value::from(self.id.as_str()),
                    Value::from(self.content.as_str()),
                    Value::from(self.send_time.as_str()),
                    Value::from(self.$dest.as_str()),
                    Value::from(self.status.as_str()),
                    Value::from(self.version),
                ]
            }

            fn from_row(row: &Row) -> Option<Self> {
                Some(Self {
                    id: row.get_str("id")?.to_string(),
                    content: row.get_str("content")?.to_string(),
                    send_time: row.get_str("send_time")?.to_string(),
                    $dest: row.get_str(stringify!($dest))?.to_string(),
                    status: MsgStatus::from_str(row.get_str("status")?)?,
                    version: row.get_i64("version")?,
                })
            }
        }
    };
}

impl_record!(Email, "email", destination);
impl_record!(WeChat, "wechat", touser);
impl_record!(Sms, "sms", mobile);

// ---------------------------------------------------------------------------
// Edit requests
// ---------------------------------------------------------------------------

/// Kind-independent view of an edit, as written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditFields {
    pub id: String,
    pub content: String,
    pub send_time: String,
    /// `None` leaves the stored recipient untouched.
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailEdit {
    pub id: String,
    pub content: String,
    pub send_time: String,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeChatEdit {
    pub id: String,
    /// Serialized template data.
    pub data: String,
    pub send_time: String,
    #[serde(default)]
    pub touser: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsEdit {
    pub id: String,
    pub content: String,
    pub send_time: String,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// An edit request, tagged by message kind:
///
/// ```json
/// {"type": "sms", "id": "m1", "content": "hi", "sendTime": "2026-01-01T08:00:00Z"}
/// ```
///
/// Any other `type` decodes to [`EditRequest::Unknown`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditRequest {
    Email(EmailEdit),
    WeChat(WeChatEdit),
    Sms(SmsEdit),
    #[serde(other)]
    Unknown,
}

/// Blank recipients mean "unchanged".
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EditRequest {
    /// Canonicalize before dispatch: trim the id and fold blank recipients into `None`.
    pub fn normalize(self) -> Self {
        match self {
            EditRequest::Email(e) => EditRequest::Email(EmailEdit {
                id: e.id.trim().to_string(),
                destination: non_blank(e.destination),
                ..e
            }),
            EditRequest::WeChat(w) => EditRequest::WeChat(WeChatEdit {
                id: w.id.trim().to_string(),
                touser: non_blank(w.touser),
                ..w
            }),
            EditRequest::Sms(s) => EditRequest::Sms(SmsEdit {
                id: s.id.trim().to_string(),
                mobile: non_blank(s.mobile),
                ..s
            }),
            EditRequest::Unknown => EditRequest::Unknown,
        }
    }
}

impl From<EmailEdit> for EditFields {
    fn from(e: EmailEdit) -> Self {
        Self {
            id: e.id,
            content: e.content,
            send_time: e.send_time,
            destination: e.destination,
        }
    }
}

impl From<WeChatEdit> for EditFields {
    fn from(w: WeChatEdit) -> Self {
        Self {
            id: w.id,
            content: w.data,
            send_time: w.send_time,
            destination: w.touser,
        }
    }
}

impl From<SmsEdit> for EditFields {
    fn from(s: SmsEdit) -> Self {
        Self {
            id: s.id,
            content: s.content,
            send_time: s.send_time,
            destination: s.mobile,
        }
    }
}
