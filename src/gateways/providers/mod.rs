pub mod paylane;
pub mod upistack;
pub mod zippay;

pub use paylane::PayLaneGateway;
pub use upistack::UpiStackGateway;
pub use zippay::ZipPayGateway;
