pub mod error;
pub mod logger;
pub mod rate_limit;
pub mod similarity;

pub use error::{ApiError, MemoryError};
pub use rate_limit::ChatRateLimiter;
pub use similarity::cosine_similarity;
