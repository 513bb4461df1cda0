//! Job descriptors, job data and identifiers.

use crate::error::{JobError, JobResult};
use crate::finite::ensure_finite;
use crate::options::{OptionSet, OPTIONS_KEY};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Broker-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID in the broker's 32-hex-digit form.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a recurring schedule. Distinct from a [`JobId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl ScheduleId {
    /// Returns the schedule ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScheduleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ScheduleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trait for job objects that carry their own serializable state.
///
/// # Example
///
/// ```rust,ignore
/// use qless_bridge::{Job, OptionSet};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct SendInvoice {
///     invoice_id: u64,
/// }
///
/// impl Job for SendInvoice {
///     const NAME: &'static str = "Billing\\SendInvoice";
///
///     fn options(&self) -> OptionSet {
///         OptionSet::new().with_retries(5)
///     }
/// }
/// ```
pub trait Job: Serialize + Send + Sync {
    /// Concrete type name, used as both display name and job identity.
    const NAME: &'static str;

    /// Options embedded with every instance of this job.
    fn options(&self) -> OptionSet {
        OptionSet::default()
    }
}

/// Ordered job parameters plus the options embedded with them.
///
/// Embedded options are held beside the fields rather than inside them.
/// A caller-supplied `__OPTIONS__` key is lifted out on construction, and the
/// options are written back under that key only when the data is serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobData {
    fields: Map<String, Value>,
    options: OptionSet,
}

impl JobData {
    /// Creates empty job data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds job data from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> JobResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(JobError::InvalidPayload(format!(
                "job data must be a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Builds job data from a JSON object.
    pub fn from_map(mut fields: Map<String, Value>) -> JobResult<Self> {
        let options = match fields.remove(OPTIONS_KEY) {
            Some(Value::Null) | None => OptionSet::default(),
            Some(value) => OptionSet::from_value(value)?,
        };

        Ok(Self { fields, options })
    }

    /// Builds job data from any serializable value that maps to a JSON object.
    ///
    /// NaN and infinite floats fail with [`JobError::Serialization`].
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> JobResult<Self> {
        Self::from_value(to_json_value(value)?)
    }

    /// Inserts a field. Inserting under `__OPTIONS__` replaces the embedded options.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) -> JobResult<()> {
        let key = key.into();
        let value = to_json_value(&value)?;

        if key == OPTIONS_KEY {
            self.options = OptionSet::from_value(value)?;
        } else {
            self.fields.insert(key, value);
        }

        Ok(())
    }

    /// Builder form of [`JobData::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> JobResult<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Returns a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the fields, without the embedded options.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns the embedded options.
    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Replaces the embedded options.
    pub fn set_options(&mut self, options: OptionSet) {
        self.options = options;
    }

    /// Builder form of [`JobData::set_options`].
    pub fn with_options(mut self, options: OptionSet) -> Self {
        self.options = options;
        self
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Lays `higher` over `self`: its fields win by key, its options win by option key.
    pub fn overlay(self, higher: JobData) -> JobData {
        let mut fields = self.fields;
        for (key, value) in higher.fields {
            fields.insert(key, value);
        }

        JobData {
            fields,
            options: self.options.overlay(&higher.options),
        }
    }

    /// Returns the wire map, with the options written under `__OPTIONS__`.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.fields.clone();
        map.insert(OPTIONS_KEY.to_string(), self.options.to_value());
        map
    }

    /// Splits into fields and embedded options.
    pub fn into_parts(self) -> (Map<String, Value>, OptionSet) {
        (self.fields, self.options)
    }
}

impl Serialize for JobData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JobData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JobData::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Lossless conversion to JSON: non-finite floats are errors, not `null`.
fn to_json_value<T: Serialize + ?Sized>(value: &T) -> JobResult<Value> {
    ensure_finite(value)?;
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Identifies the code a job runs.
///
/// Either a symbolic handler name or an in-memory job object. The
/// representation is private so every descriptor passes through a checked
/// constructor and never carries an empty identity.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescriptor {
    kind: DescriptorKind,
}

#[derive(Debug, Clone, PartialEq)]
enum DescriptorKind {
    /// `"Name"` or `"Name@method"`.
    Named(String),
    /// `state` is `None` for objects without serializable state.
    Object {
        type_name: String,
        state: Option<JobData>,
    },
}

impl JobDescriptor {
    /// Creates a descriptor from a symbolic name.
    pub fn named(identity: impl Into<String>) -> JobResult<Self> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(JobError::InvalidPayload("job name cannot be empty".to_string()));
        }
        Ok(Self {
            kind: DescriptorKind::Named(identity),
        })
    }

    /// Creates a descriptor from a job object, capturing its state and options.
    pub fn from_job<J: Job>(job: &J) -> JobResult<Self> {
        let state = JobData::from_serializable(job)?;
        let options = state.options().clone().overlay(&job.options());

        Self::object(J::NAME.to_string(), Some(state.with_options(options)))
    }

    /// Creates a descriptor for a job object with no serializable state.
    pub fn opaque(type_name: impl Into<String>) -> JobResult<Self> {
        Self::object(type_name.into(), None)
    }

    fn object(type_name: String, state: Option<JobData>) -> JobResult<Self> {
        if type_name.is_empty() {
            return Err(JobError::InvalidPayload("job type name cannot be empty".to_string()));
        }
        Ok(Self {
            kind: DescriptorKind::Object { type_name, state },
        })
    }

    /// Human-readable name: the type name, or a symbolic name up to `@`.
    pub fn display_name(&self) -> &str {
        match &self.kind {
            DescriptorKind::Named(identity) => {
                identity.split_once('@').map_or(identity.as_str(), |(name, _)| name)
            }
            DescriptorKind::Object { type_name, .. } => type_name,
        }
    }

    /// Identity written to the envelope's `job` field.
    pub fn identity(&self) -> &str {
        match &self.kind {
            DescriptorKind::Named(identity) => identity,
            DescriptorKind::Object { type_name, .. } => type_name,
        }
    }

    /// Serializable state of an object job.
    pub fn state(&self) -> Option<&JobData> {
        match &self.kind {
            DescriptorKind::Named(_) => None,
            DescriptorKind::Object { state, .. } => state.as_ref(),
        }
    }

    /// Returns true for symbolic names.
    pub fn is_named(&self) -> bool {
        matches!(self.kind, DescriptorKind::Named(_))
    }
}
