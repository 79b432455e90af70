pub mod hrv;
pub mod rr;
