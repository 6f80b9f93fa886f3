use serde::{Deserialize, Serialize};

/// A reusable unit definition. The unit body is carried as an opaque blob;
/// nothing in this crate interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub name: String,
    pub unit: String,
}

impl JobPayload {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// A named request to run a payload somewhere in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub payload: JobPayload,
}

impl Job {
    pub fn new(name: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Stored form of a job. The payload is optional on the wire so that a
/// record missing it can be recognised as corrupt instead of failing to parse.
#[derive(Debug, Deserialize)]
pub(crate) struct JobRecord {
    pub name: String,
    #[serde(default)]
    pub payload: Option<JobPayload>,
}

impl JobRecord {
    pub fn into_job(self) -> Option<Job> {
        let payload = self.payload?;
        Some(Job::new(self.name, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_json_shape() {
        let job = Job::new("web.service", JobPayload::new("web.service", "[Service]\nExecStart=/bin/true"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["name"], "web.service");
        assert_eq!(json["payload"]["name"], "web.service");
        assert_eq!(json["payload"]["unit"], "[Service]\nExecStart=/bin/true");
    }

    #[test]
    fn test_record_without_payload_is_corrupt() {
        let record: JobRecord = serde_json::from_str(r#"{"name":"web"}"#).unwrap();
        assert!(record.into_job().is_none());

        let record: JobRecord = serde_json::from_str(r#"{"name":"web","payload":null}"#).unwrap();
        assert!(record.into_job().is_none());
    }

    #[test]
    fn test_record_with_payload() {
        let record: JobRecord =
            serde_json::from_str(r#"{"name":"web","payload":{"name":"p","unit":"u"}}"#).unwrap();
        let job = record.into_job().unwrap();
        assert_eq!(job, Job::new("web", JobPayload::new("p", "u")));
    }
}
