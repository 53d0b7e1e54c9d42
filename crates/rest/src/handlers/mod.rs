//! Request handlers, one module per FHIR interaction.

mod capabilities;
mod create;
mod delete;
mod history;
mod patch;
mod read;
mod search;
mod update;

pub use capabilities::metadata_handler;
pub use create::create_handler;
pub use delete::delete_handler;
pub use history::{history_handler, vread_handler};
pub use patch::patch_handler;
pub use read::read_handler;
pub use search::search_handler;
pub use update::update_handler;

use axum::body::Bytes;
use serde_json::Value;

use crate::error::{RestError, RestResult};

/// Parses a request body as JSON, surfacing a 400 on malformed input.
pub(crate) fn parse_body(body: &Bytes) -> RestResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| RestError::bad_request(format!("malformed JSON body: {e}")))
}
