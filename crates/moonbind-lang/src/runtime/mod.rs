pub mod value;
pub mod heap;
pub mod frame;
pub mod context;
pub mod interpreter;
