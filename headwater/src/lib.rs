use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod common;
pub mod encoder;
pub mod filter;
pub mod index;
pub mod pipeline;
pub mod sampler;
pub mod scaler;
pub mod scheduler;
pub mod table;
pub mod writer;

#[cfg(feature = "python")]
mod python;
