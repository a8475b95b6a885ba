pub mod bureau;
pub mod features;
pub mod scoring;
pub mod segmentation;
pub mod underwriting;
