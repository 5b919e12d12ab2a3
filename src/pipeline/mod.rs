pub mod extraction;
pub mod chunker;
pub mod embedding;
pub mod index;
pub mod lifecycle;
pub mod evidence;
pub mod grading;
pub mod arbitration;
pub mod codec;
pub mod submit;
pub mod assist;
