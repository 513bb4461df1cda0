//! Payload codec.
//!
//! Every enqueue variant produces, and every pop consumes, one envelope shape:
//!
//! ```text
//! {"displayName": "...", "job": "...", "data": {..., "__OPTIONS__": {...}}}
//! ```

use crate::error::{JobError, JobResult};
use crate::job::{json_type, JobData, JobDescriptor};
use crate::options::OptionSet;
use serde::Serialize;
use serde_json::{Map, Value};

/// Canonical wire payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Human-readable job name.
    #[serde(rename = "displayName")]
    pub display_name: String,

    /// Job identity: the original symbolic name, or the object's type name.
    pub job: String,

    /// Job parameters, with the reconciled options embedded.
    pub data: JobData,
}

impl Envelope {
    /// Embedded options carried by this envelope.
    pub fn options(&self) -> &OptionSet {
        self.data.options()
    }

    /// Descriptor for the decoded job identity.
    pub fn descriptor(&self) -> JobResult<JobDescriptor> {
        JobDescriptor::named(self.job.clone())
    }

    /// Serializes to UTF-8 JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes to UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> JobResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Merges an object job's own state under the caller's data.
///
/// Caller-supplied fields and options win over the object's.
pub fn job_data_for(descriptor: &JobDescriptor, data: JobData) -> JobData {
    match descriptor.state() {
        Some(state) => state.clone().overlay(data),
        None => data,
    }
}

/// Builds the envelope for a job.
///
/// `options` is the reconciled option set; it replaces whatever options the
/// data carried.
pub fn encode(descriptor: &JobDescriptor, data: JobData, options: &OptionSet) -> Envelope {
    let data = job_data_for(descriptor, data).with_options(options.clone());

    Envelope {
        display_name: descriptor.display_name().to_string(),
        job: descriptor.identity().to_string(),
        data,
    }
}

/// Parses a wire envelope.
///
/// Input that is not JSON fails with [`JobError::Serialization`]; JSON with
/// the wrong shape fails with [`JobError::InvalidPayload`]. A missing
/// `displayName` is derived from `job`.
pub fn decode(raw: &[u8]) -> JobResult<Envelope> {
    let value: Value = serde_json::from_slice(raw)?;

    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(JobError::InvalidPayload(format!(
                "envelope must be a JSON object, got {}",
                json_type(&other)
            )))
        }
    };

    let job = take_string(&mut object, "job")?
        .ok_or_else(|| JobError::InvalidPayload("missing field `job`".to_string()))?;
    let descriptor = JobDescriptor::named(job.clone())?;

    let data = match object.remove("data") {
        Some(value) => JobData::from_value(value)?,
        None => return Err(JobError::InvalidPayload("missing field `data`".to_string())),
    };

    let display_name = match take_string(&mut object, "displayName")? {
        Some(name) => name,
        None => descriptor.display_name().to_string(),
    };

    Ok(Envelope {
        display_name,
        job,
        data,
    })
}

/// Rebuilds an envelope from the `klass` and `data` a broker returns.
pub fn from_broker(klass: &str, data: &str) -> JobResult<Envelope> {
    let descriptor = JobDescriptor::named(klass)?;
    let value: Value = serde_json::from_str(data)?;

    Ok(Envelope {
        display_name: descriptor.display_name().to_string(),
        job: klass.to_string(),
        data: JobData::from_value(value)?,
    })
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> JobResult<Option<String>> {
    match object.remove(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(JobError::InvalidPayload(format!(
            "field `{}` must be a string, got {}",
            key,
            json_type(&other)
        ))),
    }
}
