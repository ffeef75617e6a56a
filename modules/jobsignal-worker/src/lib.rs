pub mod analysis;
pub mod company_info;
pub mod context;
pub mod extract;
pub mod intake;
pub mod platforms;
pub mod processors;
pub mod search;
pub mod worker;

pub use context::ProcessorContext;
