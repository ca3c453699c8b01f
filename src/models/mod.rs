mod request;
mod response;
mod tokens;

pub use request::{PendingRequest, RequestContext, RequestDescriptor, headers};
pub use response::{ApiResponse, ErrorResponse};
pub use tokens::{StepUpChallenge, TokenPair};

pub(crate) use response::decode_body;
pub(crate) use tokens::{
    RefreshRequest, StepUpCredentials, authentication_methods_from, transaction_id_from,
};
