pub mod constellation;
pub mod decode;
pub mod frame;
pub mod receiver;
pub mod source;

pub use frame::{new_synchroniser, FrameConfig, FrameEvent, Payload};
