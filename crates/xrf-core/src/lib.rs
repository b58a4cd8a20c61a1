pub mod common;
pub mod domain;
pub mod fitting;
pub mod numerics;
pub mod overrides;
pub mod pipeline;
pub mod stream;
