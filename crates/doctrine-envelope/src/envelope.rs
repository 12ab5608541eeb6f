//! The canonical envelope
//!
//! Every outbound record is an [`Envelope`] before it is projected into a
//! sink dialect. There are exactly two ways to obtain one:
//!
//! - [`Envelope::construct`] builds a fresh envelope around caller data and
//!   always succeeds.
//! - [`Envelope::validate`] is the single authority turning an untyped JSON
//!   blob into a typed envelope.
//!
//! Envelopes are immutable: fields are private and only readable.

use crate::error::{value_kind, FieldIssue, ValidationError};
use crate::signature::{ExecutionSignature, SignatureGenerator};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Agent used when construction options name none
pub const DEFAULT_AGENT_ID: &str = "system";

/// Schema version used when construction options name none
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

/// Canonical field names
pub mod fields {
    //! Envelope field names, shared with the dialect converters

    /// Producing subsystem/tool
    pub const SOURCE_ID: &str = "source_id";
    /// Logical operation/task
    pub const PROCESS_ID: &str = "process_id";
    /// Approval flag
    pub const VALIDATED: &str = "validated";
    /// Forward pointer to a downstream identifier
    pub const PROMOTED_TO: &str = "promoted_to";
    /// Opaque signature minted at construction
    pub const EXECUTION_SIGNATURE: &str = "execution_signature";
    /// Last mutation instant
    pub const TIMESTAMP_LAST_TOUCHED: &str = "timestamp_last_touched";
    /// Caller business data
    pub const DATA_PAYLOAD: &str = "data_payload";

    /// All seven canonical fields
    pub const ALL: [&str; 7] = [
        SOURCE_ID,
        PROCESS_ID,
        VALIDATED,
        PROMOTED_TO,
        EXECUTION_SIGNATURE,
        TIMESTAMP_LAST_TOUCHED,
        DATA_PAYLOAD,
    ];

    /// Check whether `key` names a canonical field
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        ALL.contains(&key)
    }
}

/// Tri-state approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting review
    Pending,
    /// Approved
    Approved,
    /// Rejected
    Rejected,
}

impl ApprovalStatus {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse wire name (exact, lowercase)
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Display for ApprovalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `validated` field: a plain boolean or an [`ApprovalStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Validated {
    /// Boolean approval flag
    Flag(bool),
    /// Tri-state status
    Status(ApprovalStatus),
}

impl Validated {
    /// True iff `true` or `"approved"`
    #[inline]
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Flag(true) | Self::Status(ApprovalStatus::Approved))
    }

    /// JSON representation
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Flag(flag) => Value::Bool(*flag),
            Self::Status(status) => Value::String(status.as_str().to_string()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(flag) => Ok(Self::Flag(*flag)),
            Value::String(text) => ApprovalStatus::parse(text).map(Self::Status).ok_or_else(|| {
                format!("expected boolean or one of pending|approved|rejected, got \"{text}\"")
            }),
            other => Err(format!(
                "expected boolean or one of pending|approved|rejected, got {}",
                value_kind(other)
            )),
        }
    }
}

impl Default for Validated {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl From<bool> for Validated {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<ApprovalStatus> for Validated {
    fn from(status: ApprovalStatus) -> Self {
        Self::Status(status)
    }
}

/// Options for [`Envelope::construct`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructOptions {
    /// Producing agent (default [`DEFAULT_AGENT_ID`])
    pub agent_id: Option<String>,
    /// Blueprint (default: the process id)
    pub blueprint_id: Option<String>,
    /// Schema version (default [`DEFAULT_SCHEMA_VERSION`])
    pub schema_version: Option<String>,
}

impl ConstructOptions {
    /// Options with every field defaulted
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With agent id
    #[inline]
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// With blueprint id
    #[inline]
    #[must_use]
    pub fn with_blueprint_id(mut self, blueprint_id: impl Into<String>) -> Self {
        self.blueprint_id = Some(blueprint_id.into());
        self
    }

    /// With schema version
    #[inline]
    #[must_use]
    pub fn with_schema_version(mut self, schema_version: impl Into<String>) -> Self {
        self.schema_version = Some(schema_version.into());
        self
    }
}

/// Canonical validated record
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    source_id: String,
    process_id: String,
    validated: Validated,
    promoted_to: Option<String>,
    execution_signature: ExecutionSignature,
    timestamp_last_touched: DateTime<Utc>,
    data_payload: Option<Map<String, Value>>,
}

impl Envelope {
    /// Build a fresh envelope around `data`
    ///
    /// Always succeeds. The result is `validated = false`, has no
    /// `promoted_to`, is touched now (millisecond precision) and carries a
    /// newly minted signature.
    #[must_use]
    pub fn construct(
        source_id: impl Into<String>,
        process_id: impl Into<String>,
        data: Map<String, Value>,
        options: ConstructOptions,
    ) -> Self {
        let process_id = process_id.into();
        let agent_id = options
            .agent_id
            .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());
        let blueprint_id = options.blueprint_id.unwrap_or_else(|| process_id.clone());
        let schema_version = options
            .schema_version
            .unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string());

        let now = Utc::now().trunc_subsecs(3);

        Self {
            source_id: source_id.into(),
            process_id,
            validated: Validated::Flag(false),
            promoted_to: None,
            execution_signature: SignatureGenerator::sign_at(
                &agent_id,
                &blueprint_id,
                &schema_version,
                now,
            ),
            timestamp_last_touched: now,
            data_payload: Some(data),
        }
    }

    /// Structurally validate an untyped candidate
    ///
    /// Checks presence, type and non-emptiness of the seven canonical fields.
    /// `timestamp_last_touched` must be an RFC 3339 / ISO-8601 string;
    /// `promoted_to` and `data_payload` may be absent or `null`. Unknown keys
    /// are ignored.
    ///
    /// # Errors
    /// [`ValidationError`] listing every offending field.
    pub fn validate(candidate: &Value) -> Result<Self, ValidationError> {
        let Value::Object(map) = candidate else {
            return Err(ValidationError::NotAnObject(value_kind(candidate)));
        };

        let mut issues = Vec::new();

        let source_id = required_text(map, fields::SOURCE_ID, "Source ID is required", &mut issues);
        let process_id =
            required_text(map, fields::PROCESS_ID, "Process ID is required", &mut issues);
        let execution_signature = required_text(
            map,
            fields::EXECUTION_SIGNATURE,
            "Execution signature is required",
            &mut issues,
        );

        let validated = match map.get(fields::VALIDATED) {
            None => {
                issues.push(FieldIssue::new(fields::VALIDATED, "Required"));
                None
            }
            Some(value) => match Validated::from_value(value) {
                Ok(validated) => Some(validated),
                Err(message) => {
                    issues.push(FieldIssue::new(fields::VALIDATED, message));
                    None
                }
            },
        };

        let promoted_to = match map.get(fields::PROMOTED_TO) {
            None | Some(Value::Null) => None,
            Some(Value::String(target)) => Some(target.clone()),
            Some(other) => {
                issues.push(FieldIssue::new(
                    fields::PROMOTED_TO,
                    format!("expected string, got {}", value_kind(other)),
                ));
                None
            }
        };

        let timestamp = match map.get(fields::TIMESTAMP_LAST_TOUCHED) {
            None => {
                issues.push(FieldIssue::new(fields::TIMESTAMP_LAST_TOUCHED, "Required"));
                None
            }
            Some(Value::String(text)) => match parse_timestamp(text) {
                Some(ts) => Some(ts),
                None => {
                    issues.push(FieldIssue::new(
                        fields::TIMESTAMP_LAST_TOUCHED,
                        format!("invalid ISO-8601 datetime \"{text}\""),
                    ));
                    None
                }
            },
            Some(other) => {
                issues.push(FieldIssue::new(
                    fields::TIMESTAMP_LAST_TOUCHED,
                    format!("expected datetime string, got {}", value_kind(other)),
                ));
                None
            }
        };

        let data_payload = match map.get(fields::DATA_PAYLOAD) {
            None | Some(Value::Null) => None,
            Some(Value::Object(payload)) => Some(payload.clone()),
            Some(other) => {
                issues.push(FieldIssue::new(
                    fields::DATA_PAYLOAD,
                    format!("expected object, got {}", value_kind(other)),
                ));
                None
            }
        };

        match (source_id, process_id, validated, execution_signature, timestamp) {
            (Some(source_id), Some(process_id), Some(validated), Some(signature), Some(timestamp))
                if issues.is_empty() =>
            {
                Ok(Self {
                    source_id,
                    process_id,
                    validated,
                    promoted_to,
                    execution_signature: ExecutionSignature::from_validated(signature),
                    timestamp_last_touched: timestamp,
                    data_payload,
                })
            }
            _ => Err(ValidationError::InvalidFields(issues)),
        }
    }

    /// Producing subsystem/tool
    #[inline]
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Logical operation/task
    #[inline]
    #[must_use]
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Approval flag
    #[inline]
    #[must_use]
    pub fn validated(&self) -> Validated {
        self.validated
    }

    /// Downstream identifier, if promoted
    #[inline]
    #[must_use]
    pub fn promoted_to(&self) -> Option<&str> {
        self.promoted_to.as_deref()
    }

    /// Execution signature
    #[inline]
    #[must_use]
    pub fn execution_signature(&self) -> &ExecutionSignature {
        &self.execution_signature
    }

    /// Last mutation instant
    #[inline]
    #[must_use]
    pub fn timestamp_last_touched(&self) -> DateTime<Utc> {
        self.timestamp_last_touched
    }

    /// Last mutation instant as ISO-8601 text
    #[inline]
    #[must_use]
    pub fn timestamp_iso8601(&self) -> String {
        iso8601(&self.timestamp_last_touched)
    }

    /// Caller business data
    #[inline]
    #[must_use]
    pub fn data_payload(&self) -> Option<&Map<String, Value>> {
        self.data_payload.as_ref()
    }

    /// Canonical JSON form
    ///
    /// Absent optional fields are omitted. Feeding the result back to
    /// [`Envelope::validate`] yields an equal envelope.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(fields::SOURCE_ID.into(), Value::String(self.source_id.clone()));
        map.insert(fields::PROCESS_ID.into(), Value::String(self.process_id.clone()));
        map.insert(fields::VALIDATED.into(), self.validated.to_value());
        if let Some(target) = &self.promoted_to {
            map.insert(fields::PROMOTED_TO.into(), Value::String(target.clone()));
        }
        map.insert(
            fields::EXECUTION_SIGNATURE.into(),
            Value::String(self.execution_signature.to_string()),
        );
        map.insert(
            fields::TIMESTAMP_LAST_TOUCHED.into(),
            Value::String(self.timestamp_iso8601()),
        );
        if let Some(payload) = &self.data_payload {
            map.insert(fields::DATA_PAYLOAD.into(), Value::Object(payload.clone()));
        }
        Value::Object(map)
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

/// Render an instant as ISO-8601 UTC (`Z` suffix, shortest exact fraction)
#[must_use]
pub fn iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse ISO-8601 / RFC 3339 text into UTC
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn required_text(
    map: &Map<String, Value>,
    field: &'static str,
    missing: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    match map.get(field) {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            issues.push(FieldIssue::new(field, missing));
            None
        }
        Some(other) => {
            issues.push(FieldIssue::new(
                field,
                format!("expected string, got {}", value_kind(other)),
            ));
            None
        }
    }
}
