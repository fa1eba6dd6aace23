pub mod future;
pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod transfer;

// Re-exports for convenience
pub use future::ResponseFuture;
pub use headers::{HeaderCase, HttpHeaders};
pub use method::{AcceptedEncodings, HttpMethod};
pub use request::HttpRequest;
pub use response::{HttpResponse, ProgressCallback};
pub use transfer::{HttpTransfer, Transfer, TransferId};
