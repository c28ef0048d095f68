pub mod error;
pub mod panic;
pub mod printk;
pub mod ringbuf;

pub use error::KernelError;
