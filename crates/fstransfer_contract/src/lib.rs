pub mod error_record;
pub mod request;
pub mod status;

pub use error_record::{ErrorId, NewRequestError, RequestError};
pub use request::{
    validate_new_file_key, NewTransferRequest, ProviderName, RequestId, TransferRequest,
    ValidationError, MAX_FIELD_LEN,
};
pub use status::{RequestStatus, SchedulableStatus, DUE_PRIORITY};
