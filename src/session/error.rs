use thiserror::Error;

use crate::model::ConnectIdParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid connect id: {0}")]
    InvalidConnectId(#[from] ConnectIdParseError),
}
