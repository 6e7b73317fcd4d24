use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the datasource binding.
///
/// Driver and configuration errors are wrapped transparently so callers see
/// exactly what the MongoDB driver or figment reported.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
    #[error(transparent)]
    Config(#[from] rocket::figment::Error),
    #[error("Unsupported connector `{0}`, expected `mongodb`")]
    UnsupportedConnector(String),
    #[error("Datasource `{0}` is not connected")]
    NotConnected(String),
}

impl<'r> Responder<'r, 'static> for DataSourceError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = match self {
            DataSourceError::NotConnected(_) => Status::ServiceUnavailable,
            _ => Status::InternalServerError,
        };

        let body = json!({
            "error": self.to_string(),
            "status": status.code
        })
        .to_string();

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), std::io::Cursor::new(body))
            .ok()
    }
}
