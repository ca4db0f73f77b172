//! JSON envelope printed on stdout for every command, plus exit-code mapping.

use posctl::error::Hint;
use posctl::{Error, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: (!err.hints.is_empty()).then(|| err.hints.clone()),
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) {
    use std::io::{self, Write};

    let payload = match response.to_json() {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!("{}", err);
            return;
        }
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // A closed pipe (`posctl ... | head`) is not worth reporting.
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("write stdout: {}", e);
        }
    }
}

pub fn print_json_result(result: Result<serde_json::Value>) {
    match result {
        Ok(data) => print_response(&CliResponse::success(data)),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

/// Serialize a command's data and pick its exit code. Errors take their exit
/// code from the error category.
pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = err.code.exit_code();
            (Err(err), exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_carries_code_and_details() {
        let err = Error::manifest_locked("/srv/docker-compose.prod.yml.lock");
        let value = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "manifest.locked");
        assert_eq!(value["error"]["retryable"], true);
        assert!(value.get("data").is_none());
    }

    #[test]
    fn exit_code_follows_error_category() {
        let (_, code) = map_cmd_result_to_json::<()>(Err(Error::artifact_missing("x.whl")));
        assert_eq!(code, 4);

        let (value, code) = map_cmd_result_to_json(Ok((vec!["ok"], 0)));
        assert_eq!(code, 0);
        assert_eq!(value.unwrap(), serde_json::json!(["ok"]));
    }
}
