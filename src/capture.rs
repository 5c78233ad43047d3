pub mod recorder;
pub mod request;

pub use recorder::RequestRecorder;
pub use request::RequestHead;
