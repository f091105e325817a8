pub mod roberta;
pub mod xlm_roberta;

pub use roberta::RobertaEncoder;
pub use xlm_roberta::{chunk_ranges, XlmRobertaModel, CHUNK_SIZE};
