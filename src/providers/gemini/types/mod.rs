pub mod request;
pub mod response;

pub use request::{Content, GenerateContentRequest, GenerationConfig, Part};

pub use response::{
    no_response_message, ApiError, Candidate, CandidateContent, ErrorResponse,
    GenerateContentResponse, PromptFeedback, ResponsePart, StreamPayload, UsageMetadata,
    NO_RESPONSE,
};
