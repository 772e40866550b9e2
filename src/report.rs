//! JSON record handed back to the invoking collaborator

use crate::pipeline::RunOutcome;
use crate::types::VegResult;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunReport {
    Success {
        deforestation_percentage: f64,
        status: String,
    },
    Error {
        status: String,
        message: String,
    },
}

impl RunReport {
    pub fn from_result(result: &VegResult<RunOutcome>) -> Self {
        match result {
            Ok(outcome) => RunReport::Success {
                deforestation_percentage: outcome.classification.deforestation_percentage,
                status: outcome.classification.status().to_string(),
            },
            Err(e) => RunReport::Error {
                status: "error".to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunReport::Error { .. })
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings and floats cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"failed to serialize report"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VegError;

    #[test]
    fn test_error_record_shape() {
        let result: VegResult<RunOutcome> = Err(VegError::Config("bad key".to_string()));
        let report = RunReport::from_result(&result);
        assert!(report.is_error());

        let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Configuration error: bad key");
    }

    #[test]
    fn test_success_record_shape() {
        let report = RunReport::Success {
            deforestation_percentage: 12.5,
            status: "🚨 Significant deforestation detected!".to_string(),
        };
        assert_eq!(
            report.to_json(),
            r#"{"deforestation_percentage":12.5,"status":"🚨 Significant deforestation detected!"}"#
        );
    }
}
